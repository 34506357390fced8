//! Live Activity lifecycle tests
//!
//! Need a cluster running the controller and credentials for the account it
//! manages:
//!
//! ```bash
//! E2E_SERVICES=sfn cargo test --test activity_test
//! ```

use sfn_e2e::{equal_modulo_system_tags, sfn, BoxError, Harness, SystemTagPolicy};

#[sfn_e2e::test(service = "sfn")]
async fn test_create_activity(harness: Harness) -> Result<(), BoxError> {
    let desired = sfn::activity_desired(&harness)?;

    harness
        .lifecycle(sfn::activity(), desired)
        .run(|activity| async move {
            assert!(
                activity.exists().await,
                "{} should exist remotely",
                activity.name()
            );

            let tags = activity.tags().await?;
            activity.check_system_tags(&tags)?;
            assert!(equal_modulo_system_tags(
                &sfn::initial_tags(),
                &tags,
                &SystemTagPolicy::default()
            ));
            Ok::<_, BoxError>(())
        })
        .await?;

    Ok(())
}

#[sfn_e2e::test(service = "sfn")]
async fn test_update_activity_tags(harness: Harness) -> Result<(), BoxError> {
    let desired = sfn::activity_desired(&harness)?;

    harness
        .lifecycle(sfn::activity(), desired)
        .run(|mut activity| async move {
            let updated = sfn::updated_tags();
            activity.set_tags(&updated).await?;

            let observed = activity.wait_for_tags(&updated).await?;
            activity.check_system_tags(&observed)?;
            Ok::<_, BoxError>(())
        })
        .await?;

    Ok(())
}

#[sfn_e2e::test(service = "sfn")]
async fn test_delete_activity(harness: Harness) -> Result<(), BoxError> {
    let desired = sfn::activity_desired(&harness)?;

    harness
        .lifecycle(sfn::activity(), desired)
        .run(|activity| async move {
            activity.delete().await?;
            assert!(
                !activity.exists().await,
                "{} should be gone after deletion",
                activity.identifier()
            );
            Ok::<_, BoxError>(())
        })
        .await?;

    Ok(())
}
