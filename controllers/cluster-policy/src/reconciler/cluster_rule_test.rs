//! Unit tests for the cluster rule reconciler

#[cfg(test)]
mod tests {
    use crate::diff::{Action, Operation, OperationSet};
    use crate::error::ControllerError;
    use crate::reconcile_helpers::Outcome;
    use crate::records::RuleRecord;
    use crate::test_utils::*;
    use resources::{ClusterRuleStatus, ResourceState, RuleSpec, TriState};
    use std::sync::Arc;
    use vsphere_client::{ClusterConfiguration, ClusterRuleKind, ManagedObjectReference, VSphereError};

    fn seeded_rule(mock: &vsphere_client::MockVSphereClient) {
        mock.set_cluster_configuration(
            CLUSTER_ID,
            ClusterConfiguration {
                rules: vec![observed_rule_info(42, "x", "r1", Some(true), Some(false), &["vm-a"])],
                dpm_host_configs: vec![],
            },
        );
    }

    #[tokio::test]
    async fn test_create_rule() {
        let mock = mock_with_cluster();
        let reconciler = reconciler_for(&mock);
        let spec = anti_affinity_spec("r1", &["vm-a", "vm-b"], TriState::True, TriState::False);

        let (outcome, status) = reconciler.reconcile_cluster_rule(&spec, None).await.unwrap();

        assert_eq!(outcome, Outcome::Created);
        assert_eq!(status.state, ResourceState::Created);
        assert!(status.key.is_some());
        assert!(status.rule_uuid.is_some());
        assert_eq!(status.user_created, Some(true));
        assert!(status.last_reconciled.is_some());

        let config = mock.cluster_configuration(CLUSTER_ID).unwrap();
        assert_eq!(config.rules.len(), 1);
        let rule = &config.rules[0];
        assert_eq!(rule.name.as_deref(), Some("r1"));
        assert_eq!(rule.enabled, Some(true));
        assert_eq!(rule.mandatory, Some(false));
        assert_eq!(
            rule.kind,
            ClusterRuleKind::AntiAffinity {
                vm: vec![
                    ManagedObjectReference::virtual_machine("vm-a"),
                    ManagedObjectReference::virtual_machine("vm-b"),
                ],
            }
        );
    }

    #[tokio::test]
    async fn test_second_reconcile_is_a_no_op() {
        let mock = mock_with_cluster();
        let reconciler = reconciler_for(&mock);
        let spec = anti_affinity_spec("r1", &["vm-a", "vm-b"], TriState::True, TriState::False);

        let (_, status) = reconciler.reconcile_cluster_rule(&spec, None).await.unwrap();
        assert_eq!(mock.reconfigure_calls(), 1);

        let actions = reconciler.plan_cluster_rule(&spec, Some(&status), true).await.unwrap();
        assert!(actions.is_empty());

        let (outcome, again) = reconciler.reconcile_cluster_rule(&spec, Some(&status)).await.unwrap();
        assert_eq!(outcome, Outcome::Unchanged);
        assert_eq!(again.key, status.key);
        assert_eq!(again.state, ResourceState::Created);
        assert_eq!(mock.reconfigure_calls(), 1);
    }

    #[tokio::test]
    async fn test_update_keeps_key_and_uuid() {
        let mock = mock_with_cluster();
        seeded_rule(&mock);
        let reconciler = reconciler_for(&mock);
        let previous = ClusterRuleStatus {
            key: Some(42),
            state: ResourceState::Created,
            ..Default::default()
        };
        let spec = anti_affinity_spec("r1", &["vm-a"], TriState::False, TriState::Unset);

        let actions = reconciler.plan_cluster_rule(&spec, Some(&previous), true).await.unwrap();
        assert_eq!(actions, vec![Action::Update]);

        let (outcome, status) = reconciler.reconcile_cluster_rule(&spec, Some(&previous)).await.unwrap();
        assert_eq!(outcome, Outcome::Updated);
        assert_eq!(status.state, ResourceState::Updated);
        assert_eq!(status.key, Some(42));
        assert_eq!(status.rule_uuid.as_deref(), Some("x"));

        let rule = &mock.cluster_configuration(CLUSTER_ID).unwrap().rules[0];
        assert_eq!(rule.key, Some(42));
        assert_eq!(rule.enabled, Some(false));
        // Unset in the manifest, so the observed value is kept
        assert_eq!(rule.mandatory, Some(false));
    }

    #[tokio::test]
    async fn test_member_order_is_not_drift() {
        let mock = mock_with_cluster();
        mock.set_cluster_configuration(
            CLUSTER_ID,
            ClusterConfiguration {
                rules: vec![observed_rule_info(7, "u", "r1", Some(true), Some(false), &["vm-a", "vm-b"])],
                dpm_host_configs: vec![],
            },
        );
        let reconciler = reconciler_for(&mock);
        let spec = anti_affinity_spec("r1", &["vm-b", "vm-a"], TriState::True, TriState::Unset);

        let actions = reconciler.plan_cluster_rule(&spec, None, true).await.unwrap();
        assert!(actions.is_empty());
    }

    #[tokio::test]
    async fn test_rename_by_key() {
        let mock = mock_with_cluster();
        seeded_rule(&mock);
        let reconciler = reconciler_for(&mock);
        let previous = ClusterRuleStatus {
            key: Some(42),
            ..Default::default()
        };
        let spec = anti_affinity_spec("r1-renamed", &["vm-a"], TriState::True, TriState::False);

        let (outcome, status) = reconciler.reconcile_cluster_rule(&spec, Some(&previous)).await.unwrap();
        assert_eq!(outcome, Outcome::Updated);
        assert_eq!(status.key, Some(42));

        let config = mock.cluster_configuration(CLUSTER_ID).unwrap();
        assert_eq!(config.rules.len(), 1);
        assert_eq!(config.rules[0].name.as_deref(), Some("r1-renamed"));
    }

    #[tokio::test]
    async fn test_kind_change_replaces_rule() {
        let mock = mock_with_cluster();
        seeded_rule(&mock);
        let reconciler = reconciler_for(&mock);
        let previous = ClusterRuleStatus {
            key: Some(42),
            ..Default::default()
        };
        let mut spec = anti_affinity_spec("r1", &["vm-a"], TriState::True, TriState::False);
        spec.rule = RuleSpec::VmAffinity {
            virtual_machine_ids: vec!["vm-a".to_string(), "vm-c".to_string()],
        };

        let actions = reconciler.plan_cluster_rule(&spec, Some(&previous), true).await.unwrap();
        assert_eq!(actions, vec![Action::Delete, Action::Create]);

        let (outcome, status) = reconciler.reconcile_cluster_rule(&spec, Some(&previous)).await.unwrap();
        assert_eq!(outcome, Outcome::Replaced);
        assert_ne!(status.key, Some(42));

        let config = mock.cluster_configuration(CLUSTER_ID).unwrap();
        assert_eq!(config.rules.len(), 1);
        assert!(matches!(config.rules[0].kind, ClusterRuleKind::Affinity { .. }));
    }

    #[tokio::test]
    async fn test_unmanaged_rules_are_carried_through() {
        let mock = mock_with_cluster();
        let foreign = observed_rule_info(7, "foreign", "ha-spread", Some(true), Some(true), &["vm-z"]);
        mock.set_cluster_configuration(
            CLUSTER_ID,
            ClusterConfiguration {
                rules: vec![foreign.clone()],
                dpm_host_configs: vec![],
            },
        );
        let reconciler = reconciler_for(&mock);
        let spec = anti_affinity_spec("r1", &["vm-a"], TriState::True, TriState::Unset);

        reconciler.reconcile_cluster_rule(&spec, None).await.unwrap();
        reconciler.delete_cluster_rule(&spec, None).await.unwrap();

        let config = mock.cluster_configuration(CLUSTER_ID).unwrap();
        assert_eq!(config.rules.len(), 1);
        assert_eq!(config.rules[0].key, foreign.key);
        assert_eq!(config.rules[0].name, foreign.name);
        assert_eq!(config.rules[0].kind, foreign.kind);
    }

    #[tokio::test]
    async fn test_delete_rule() {
        let mock = mock_with_cluster();
        seeded_rule(&mock);
        let reconciler = reconciler_for(&mock);
        let spec = anti_affinity_spec("r1", &["vm-a"], TriState::True, TriState::False);
        let previous = ClusterRuleStatus {
            key: Some(42),
            ..Default::default()
        };

        let outcome = reconciler.delete_cluster_rule(&spec, Some(&previous)).await.unwrap();
        assert_eq!(outcome, Outcome::Deleted);
        assert!(mock.cluster_configuration(CLUSTER_ID).unwrap().rules.is_empty());

        let outcome = reconciler.delete_cluster_rule(&spec, Some(&previous)).await.unwrap();
        assert_eq!(outcome, Outcome::Unchanged);
        assert_eq!(mock.reconfigure_calls(), 1);
    }

    #[tokio::test]
    async fn test_delete_with_missing_cluster_succeeds() {
        let mock = mock_with_cluster();
        seeded_rule(&mock);
        let reconciler = reconciler_for(&mock);
        let spec = anti_affinity_spec("r1", &["vm-a"], TriState::True, TriState::False);

        let planned = reconciler.plan_member(CLUSTER_ID, None, &RuleRecord::from_spec(&spec, Some(42))).await.unwrap();
        assert_eq!(planned.actions(), vec![Action::Delete]);

        mock.remove_cluster(CLUSTER_ID);
        let outcome = reconciler.delete_cluster_rule(&spec, None).await.unwrap();
        assert_eq!(outcome, Outcome::Unchanged);

        let (outcome, applied) = reconciler.apply(CLUSTER_ID, None, planned).await.unwrap();
        assert_eq!(outcome, Outcome::Unchanged);
        assert!(applied.is_none());
        assert!(reconciler.read_cluster_rule(&spec, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reconcile_in_missing_cluster_is_not_found() {
        let mock = mock_with_cluster();
        mock.remove_cluster(CLUSTER_ID);
        let reconciler = reconciler_for(&mock);
        let spec = anti_affinity_spec("r1", &["vm-a"], TriState::True, TriState::False);

        let err = reconciler.reconcile_cluster_rule(&spec, None).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_rewritten_value_is_a_convergence_error() {
        let mock = mock_with_cluster();
        mock.set_reconfigure_hook(Arc::new(|config: &mut ClusterConfiguration| {
            for rule in config.rules.iter_mut() {
                rule.enabled = Some(false);
            }
        }));
        let reconciler = reconciler_for(&mock);
        let spec = anti_affinity_spec("r1", &["vm-a"], TriState::True, TriState::Unset);

        let err = reconciler.reconcile_cluster_rule(&spec, None).await.unwrap_err();
        match err {
            ControllerError::Convergence { identity, operation, .. } => {
                assert_eq!(identity, "rule r1");
                assert_eq!(operation, "create");
            }
            other => panic!("expected a convergence error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_adopts_rule_that_appeared_after_planning() {
        let mock = mock_with_cluster();
        let reconciler = reconciler_for(&mock);
        let spec = anti_affinity_spec("r1", &["vm-a"], TriState::True, TriState::False);
        let desired = RuleRecord::from_spec(&spec, None);

        let planned = reconciler.plan_member(CLUSTER_ID, Some(&desired), &desired).await.unwrap();
        assert_eq!(planned.actions(), vec![Action::Create]);

        seeded_rule(&mock);
        let (outcome, applied) = reconciler.apply(CLUSTER_ID, Some(&desired), planned).await.unwrap();
        // Nothing was written, so nothing was created
        assert_eq!(outcome, Outcome::Unchanged);
        assert_eq!(applied.unwrap().key, Some(42));
        assert_eq!(mock.reconfigure_calls(), 0);
    }

    #[tokio::test]
    async fn test_update_of_vanished_rule_recreates_it() {
        let mock = mock_with_cluster();
        seeded_rule(&mock);
        let reconciler = reconciler_for(&mock);
        let spec = anti_affinity_spec("r1", &["vm-a"], TriState::False, TriState::False);
        let desired = RuleRecord::from_spec(&spec, Some(42));

        let planned = reconciler.plan_member(CLUSTER_ID, Some(&desired), &desired).await.unwrap();
        assert_eq!(planned.actions(), vec![Action::Update]);

        mock.set_cluster_configuration(CLUSTER_ID, ClusterConfiguration::default());
        let (outcome, applied) = reconciler.apply(CLUSTER_ID, Some(&desired), planned).await.unwrap();
        let applied = applied.unwrap();
        assert_eq!(outcome, Outcome::Created);

        assert_ne!(applied.key, Some(42));
        assert_eq!(applied.enabled, TriState::False);
        assert_eq!(mock.cluster_configuration(CLUSTER_ID).unwrap().rules.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_plan_applies_nothing() {
        let mock = mock_with_cluster();
        let reconciler = reconciler_for(&mock);

        let (outcome, applied) = reconciler
            .apply::<RuleRecord>(CLUSTER_ID, None, OperationSet::empty())
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Unchanged);
        assert!(applied.is_none());
        assert_eq!(mock.reconfigure_calls(), 0);
    }

    #[tokio::test]
    async fn test_reconfigure_error_is_surfaced() {
        let mock = mock_with_cluster();
        mock.fail_next_reconfigure("rule conflicts with an existing rule");
        let reconciler = reconciler_for(&mock);
        let spec = anti_affinity_spec("r1", &["vm-a"], TriState::True, TriState::False);

        let err = reconciler.reconcile_cluster_rule(&spec, None).await.unwrap_err();
        assert!(matches!(err, ControllerError::Gateway(VSphereError::Api(_))));
        assert!(mock.cluster_configuration(CLUSTER_ID).unwrap().rules.is_empty());
    }

    #[tokio::test]
    async fn test_failed_task_is_surfaced() {
        let mock = mock_with_cluster();
        mock.fail_next_task("insufficient privileges");
        let reconciler = reconciler_for(&mock);
        let spec = anti_affinity_spec("r1", &["vm-a"], TriState::True, TriState::False);
        let desired = RuleRecord::from_spec(&spec, None);

        let err = reconciler
            .apply(CLUSTER_ID, Some(&desired), OperationSet::single(Operation::Create(desired.clone())))
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::Gateway(VSphereError::TaskFailed { .. })));
        assert!(mock.cluster_configuration(CLUSTER_ID).unwrap().rules.is_empty());
    }

    #[tokio::test]
    async fn test_unset_field_changed_after_planning_is_not_overwritten() {
        let mock = mock_with_cluster();
        seeded_rule(&mock);
        let reconciler = reconciler_for(&mock);
        // enabled is left to vCenter, mandatory is managed
        let spec = anti_affinity_spec("r1", &["vm-a"], TriState::Unset, TriState::True);
        let desired = RuleRecord::from_spec(&spec, Some(42));

        let planned = reconciler.plan_member(CLUSTER_ID, Some(&desired), &desired).await.unwrap();
        assert_eq!(planned.actions(), vec![Action::Update]);

        // Someone disables the rule between plan and apply
        let mut config = mock.cluster_configuration(CLUSTER_ID).unwrap();
        config.rules[0].enabled = Some(false);
        mock.set_cluster_configuration(CLUSTER_ID, config);

        let (outcome, applied) = reconciler.apply(CLUSTER_ID, Some(&desired), planned).await.unwrap();
        let applied = applied.unwrap();
        assert_eq!(outcome, Outcome::Updated);
        assert_eq!(applied.enabled, TriState::False);
        assert_eq!(applied.mandatory, TriState::True);

        let rule = &mock.cluster_configuration(CLUSTER_ID).unwrap().rules[0];
        assert_eq!(rule.enabled, Some(false));
        assert_eq!(rule.mandatory, Some(true));
    }

    #[tokio::test]
    async fn test_update_that_became_a_no_op_is_unchanged() {
        let mock = mock_with_cluster();
        seeded_rule(&mock);
        let reconciler = reconciler_for(&mock);
        let spec = anti_affinity_spec("r1", &["vm-a"], TriState::True, TriState::True);
        let desired = RuleRecord::from_spec(&spec, Some(42));

        let planned = reconciler.plan_member(CLUSTER_ID, Some(&desired), &desired).await.unwrap();
        assert_eq!(planned.actions(), vec![Action::Update]);

        let mut config = mock.cluster_configuration(CLUSTER_ID).unwrap();
        config.rules[0].mandatory = Some(true);
        mock.set_cluster_configuration(CLUSTER_ID, config);

        let (outcome, applied) = reconciler.apply(CLUSTER_ID, Some(&desired), planned).await.unwrap();
        assert_eq!(outcome, Outcome::Unchanged);
        assert_eq!(applied.unwrap().mandatory, TriState::True);
        assert_eq!(mock.reconfigure_calls(), 0);
    }
}
