//! Process-wide crash isolation.
//!
//! The guard is global, so the whole lifecycle is exercised in one test.

use std::sync::Arc;

use corona_bootstrap::testing::ScriptedDialogs;
use corona_bootstrap::{execute_protected, initialize_crash_handling, EXIT_FAILURE};

#[test]
fn test_execute_protected_reports_first_fault_only() {
    let dialogs = Arc::new(ScriptedDialogs::default());
    let guard = initialize_crash_handling(dialogs.clone());

    // A second initialisation keeps the first reporter.
    let other = Arc::new(ScriptedDialogs::default());
    let again = initialize_crash_handling(other.clone());
    assert!(std::ptr::eq(guard, again));

    assert_eq!(execute_protected(|| 3), 3);
    assert!(dialogs.shown().is_empty());

    let code = execute_protected(|| -> i32 {
        let args: Vec<String> = Vec::new();
        panic!("index out of range: {}", args.len() + 4)
    });
    assert_eq!(code, EXIT_FAILURE);

    let code = execute_protected(|| panic!("fault while terminating"));
    assert_eq!(code, EXIT_FAILURE);

    let errors = dialogs.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("index out of range: 4"));
    assert!(errors[0].contains("crash_isolation.rs"));
    assert!(guard.has_reported());
    assert!(other.shown().is_empty());
}
