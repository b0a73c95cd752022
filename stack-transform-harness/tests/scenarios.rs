//! Runs all six seed end-to-end scenarios from spec §8, one test per
//! scenario, the same one-file-per-case layout `minidumper-test`'s
//! `tests/abort.rs`, `tests/trap.rs`, etc. use.

#[test]
fn rewrite_double() {
    stack_transform_harness::run_scenario("rewrite_double").unwrap();
}

#[test]
fn rewrite_copy() {
    stack_transform_harness::run_scenario("rewrite_copy").unwrap();
}

#[test]
fn callee_saved() {
    stack_transform_harness::run_scenario("callee_saved").unwrap();
}

#[test]
fn stack_pointer() {
    stack_transform_harness::run_scenario("stack_pointer").unwrap();
}

#[test]
fn rewrite_many() {
    stack_transform_harness::run_scenario("rewrite_many").unwrap();
}

#[test]
fn rewrite_thread() {
    stack_transform_harness::run_scenario("rewrite_thread").unwrap();
}

#[test]
fn unknown_scenario_is_rejected() {
    assert!(stack_transform_harness::run_scenario("not_a_scenario").is_err());
}
