//! Unit tests for the DPM host override reconciler

#[cfg(test)]
mod tests {
    use crate::diff::Action;
    use crate::reconcile_helpers::Outcome;
    use crate::test_utils::*;
    use resources::{DpmAutomationLevel, HostOverrideStatus, ResourceState};
    use vsphere_client::{ClusterConfiguration, ClusterDpmHostConfigInfo, DpmBehavior, ManagedObjectReference};

    fn seeded_override(mock: &vsphere_client::MockVSphereClient) {
        mock.set_cluster_configuration(
            CLUSTER_ID,
            ClusterConfiguration {
                rules: vec![],
                dpm_host_configs: vec![ClusterDpmHostConfigInfo {
                    key: Some(9),
                    host: Some(ManagedObjectReference::host("host-1")),
                    behavior: Some(DpmBehavior::Manual),
                    enabled: Some(false),
                }],
            },
        );
    }

    #[tokio::test]
    async fn test_create_override() {
        let mock = mock_with_cluster();
        let reconciler = reconciler_for(&mock);
        let spec = host_override_spec("host-1", DpmAutomationLevel::Automated, true);

        let (outcome, status) = reconciler.reconcile_host_override(&spec, None).await.unwrap();
        assert_eq!(outcome, Outcome::Created);
        assert_eq!(status.state, ResourceState::Created);
        assert!(status.key.is_some());

        let config = mock.cluster_configuration(CLUSTER_ID).unwrap();
        assert_eq!(config.dpm_host_configs.len(), 1);
        let dpm = &config.dpm_host_configs[0];
        assert_eq!(dpm.host, Some(ManagedObjectReference::host("host-1")));
        assert_eq!(dpm.behavior, Some(DpmBehavior::Automated));
        assert_eq!(dpm.enabled, Some(true));
    }

    #[tokio::test]
    async fn test_second_reconcile_is_a_no_op() {
        let mock = mock_with_cluster();
        let reconciler = reconciler_for(&mock);
        let spec = host_override_spec("host-1", DpmAutomationLevel::Automated, true);

        let (_, status) = reconciler.reconcile_host_override(&spec, None).await.unwrap();
        let (outcome, again) = reconciler.reconcile_host_override(&spec, Some(&status)).await.unwrap();

        assert_eq!(outcome, Outcome::Unchanged);
        assert_eq!(again.key, status.key);
        assert_eq!(mock.reconfigure_calls(), 1);
        assert!(reconciler.plan_host_override(&spec, true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_override_keeps_key() {
        let mock = mock_with_cluster();
        seeded_override(&mock);
        let reconciler = reconciler_for(&mock);
        let spec = host_override_spec("host-1", DpmAutomationLevel::Automated, false);
        let previous = HostOverrideStatus {
            key: Some(9),
            state: ResourceState::Created,
            ..Default::default()
        };

        assert_eq!(reconciler.plan_host_override(&spec, true).await.unwrap(), vec![Action::Update]);

        let (outcome, status) = reconciler.reconcile_host_override(&spec, Some(&previous)).await.unwrap();
        assert_eq!(outcome, Outcome::Updated);
        assert_eq!(status.key, Some(9));
        assert_eq!(status.state, ResourceState::Updated);

        let dpm = &mock.cluster_configuration(CLUSTER_ID).unwrap().dpm_host_configs[0];
        assert_eq!(dpm.behavior, Some(DpmBehavior::Automated));
        assert_eq!(dpm.enabled, Some(false));
    }

    #[tokio::test]
    async fn test_delete_override() {
        let mock = mock_with_cluster();
        seeded_override(&mock);
        let reconciler = reconciler_for(&mock);
        let spec = host_override_spec("host-1", DpmAutomationLevel::Manual, false);

        assert_eq!(reconciler.plan_host_override(&spec, false).await.unwrap(), vec![Action::Delete]);
        assert_eq!(reconciler.delete_host_override(&spec).await.unwrap(), Outcome::Deleted);
        assert!(mock.cluster_configuration(CLUSTER_ID).unwrap().dpm_host_configs.is_empty());

        assert_eq!(reconciler.delete_host_override(&spec).await.unwrap(), Outcome::Unchanged);
        assert!(reconciler.read_host_override(&spec).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_other_hosts_are_untouched() {
        let mock = mock_with_cluster();
        seeded_override(&mock);
        let reconciler = reconciler_for(&mock);
        let spec = host_override_spec("host-2", DpmAutomationLevel::Automated, true);

        reconciler.reconcile_host_override(&spec, None).await.unwrap();

        let config = mock.cluster_configuration(CLUSTER_ID).unwrap();
        assert_eq!(config.dpm_host_configs.len(), 2);
        let untouched = config
            .dpm_host_configs
            .iter()
            .find(|c| c.key == Some(9))
            .unwrap();
        assert_eq!(untouched.behavior, Some(DpmBehavior::Manual));
    }

    #[tokio::test]
    async fn test_missing_cluster() {
        let mock = mock_with_cluster();
        mock.remove_cluster(CLUSTER_ID);
        let reconciler = reconciler_for(&mock);
        let spec = host_override_spec("host-1", DpmAutomationLevel::Automated, true);

        let err = reconciler.reconcile_host_override(&spec, None).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(reconciler.delete_host_override(&spec).await.unwrap(), Outcome::Unchanged);
    }
}
