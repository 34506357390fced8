//! Integration tests for the #[sfn_e2e::test] macro

#[allow(unused_imports)] // Used in macro-expanded function signatures
use sfn_e2e::BoxError;

/// Without a service marker the test always runs
#[sfn_e2e::test]
async fn test_macro_without_service() {
    let x = 1 + 1;
    assert_eq!(x, 2);
}

/// `Ok` bodies pass; `?` resolves against the declared error type
#[sfn_e2e::test]
async fn test_macro_result_ok() -> Result<(), BoxError> {
    let n: u32 = "42".parse()?;
    assert_eq!(n, 42);
    Ok(())
}

/// The body only runs when the marker selects the service
#[sfn_e2e::test(service = "no-such-service")]
async fn test_macro_skips_unselected_service() {
    assert!(sfn_e2e::marker::service_selected("no-such-service"));
}
