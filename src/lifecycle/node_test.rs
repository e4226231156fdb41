#[cfg(test)]
mod tests {
    use crate::error::AgentError;
    use crate::lifecycle::kind::ExecutorKind;
    use crate::lifecycle::node::{scale_request, ScaleAction};
    use crate::run::RunDocument;

    fn doc(states: &[(&str, &str)]) -> RunDocument {
        let names: Vec<&str> = states.iter().map(|(n, _)| *n).collect();
        let params: String = states
            .iter()
            .map(|(name, state)| {
                format!(
                    r#"<entry><runtimeParameter key="{name}:scale.state" group="{name}">{state}</runtimeParameter></entry>"#
                )
            })
            .collect();
        let xml = format!(
            r#"<run type="Orchestration" nodeNames="{}"><module category="Deployment"/><runtimeParameters>{params}</runtimeParameters></run>"#,
            names.join(",")
        );
        RunDocument::parse(&xml).unwrap()
    }

    #[test]
    fn test_scale_action_targets() {
        assert_eq!(ScaleAction::NodeAdd.target_name(), "onvmadd");
        assert_eq!(ScaleAction::NodeRemove.target_name(), "onvmremove");
        assert_eq!(ScaleAction::DiskResize.target_name(), "ondiskresize");
    }

    #[test]
    fn test_no_request_when_operational() {
        let d = doc(&[("apache.1", "operational"), ("apache.2", "operational")]);
        assert_eq!(scale_request(&d, "apache.1").unwrap(), None);
    }

    #[test]
    fn test_add_wins_over_remove() {
        let d = doc(&[
            ("apache.1", "operational"),
            ("apache.2", "removing"),
            ("apache.3", "created"),
            ("apache.4", "creating"),
        ]);
        let req = scale_request(&d, "apache.1").unwrap().unwrap();
        assert_eq!(req.action, ScaleAction::NodeAdd);
        assert_eq!(req.node_name, "apache");
        assert_eq!(req.instances, vec!["apache.3", "apache.4"]);
    }

    #[test]
    fn test_remove_then_resize() {
        let d = doc(&[("apache.1", "operational"), ("apache.2", "removing"), ("db.1", "resizing")]);
        let req = scale_request(&d, "apache.1").unwrap().unwrap();
        assert_eq!(req.action, ScaleAction::NodeRemove);
        assert_eq!(req.instances, vec!["apache.2"]);

        let d = doc(&[("apache.1", "operational"), ("db.1", "resizing")]);
        let req = scale_request(&d, "apache.1").unwrap().unwrap();
        assert_eq!(req.action, ScaleAction::DiskResize);
        assert_eq!(req.node_name, "db");
    }

    #[test]
    fn test_own_instance_and_orchestrators_are_ignored() {
        let d = doc(&[("apache.1", "creating"), ("orchestrator-cloud", "creating")]);
        assert_eq!(scale_request(&d, "apache.1").unwrap(), None);
    }

    #[test]
    fn test_executor_kind_table() {
        assert_eq!(ExecutorKind::from_run_type("Machine").unwrap(), ExecutorKind::Machine);
        assert_eq!(ExecutorKind::from_run_type("Run").unwrap(), ExecutorKind::NodeDeployment);
        assert_eq!(
            ExecutorKind::from_run_type("Orchestration").unwrap(),
            ExecutorKind::NodeDeployment
        );
        assert!(matches!(ExecutorKind::from_run_type("Build"), Err(AgentError::Client { .. })));

        assert_eq!(
            ExecutorKind::resolve("Orchestration", "Deployment", "orchestrator-exo", true).unwrap(),
            ExecutorKind::Orchestrator
        );
        assert_eq!(
            ExecutorKind::resolve("Orchestration", "Image", "orchestrator-exo", true).unwrap(),
            ExecutorKind::ImageBuild
        );
        assert_eq!(
            ExecutorKind::resolve("Orchestration", "Deployment", "orchestrator-exo", false).unwrap(),
            ExecutorKind::NodeDeployment
        );
        assert_eq!(
            ExecutorKind::resolve("Machine", "Image", "machine", true).unwrap(),
            ExecutorKind::Machine
        );
        assert_eq!(
            ExecutorKind::resolve("Run", "Deployment", "apache.1", true).unwrap(),
            ExecutorKind::NodeDeployment
        );
    }
}
