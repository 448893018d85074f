//! Unit tests for the container executor against `MockClusterClient`

#[cfg(test)]
mod tests {
    use crate::config::ExecutorConfig;
    use crate::error::ControllerError;
    use crate::executor::{Executor, ReferenceKind};
    use crate::naming::object_name;
    use crate::test_utils::{
        config_map, container_function, eventually, next_revision, secret, test_config, test_executor,
        test_executor_with_config,
    };
    use cluster_client::{ClusterClientTrait, MockClusterClient};
    use crds::{ConfigMapReference, ExecutorType, RESOURCE_VERSION_COUNT, SecretReference};
    use fscache::FunctionMeta;
    use futures::future::join_all;
    use k8s_openapi::api::apps::v1::Deployment;
    use std::time::Duration;

    fn name_of(function: &crds::Function) -> String {
        object_name(&FunctionMeta::from_object_meta(&function.metadata).unwrap())
    }

    fn rv_count_env(deployment: &Deployment, container: &str) -> Option<String> {
        deployment
            .spec
            .as_ref()?
            .template
            .spec
            .as_ref()?
            .containers
            .iter()
            .find(|c| c.name == container)?
            .env
            .as_ref()?
            .iter()
            .find(|e| e.name == RESOURCE_VERSION_COUNT)?
            .value
            .clone()
    }

    #[tokio::test]
    async fn test_create_function_provisions_service_deployment_hpa_in_order() {
        let mock = MockClusterClient::new();
        let executor = test_executor(&mock);
        let function = container_function("f1", "default", "u1");
        let name = name_of(&function);

        let fsvc = executor.get_func_svc(&function).await.unwrap();

        assert_eq!(fsvc.name, name);
        assert_eq!(fsvc.address, format!("{}.default", name));
        assert_eq!(fsvc.executor, ExecutorType::Container);
        assert_eq!(fsvc.kubernetes_objects.len(), 3);

        let creates: Vec<String> = mock
            .calls()
            .into_iter()
            .filter(|c| c.operation.starts_with("create_"))
            .map(|c| c.operation)
            .collect();
        assert_eq!(creates, vec!["create_service", "create_deployment", "create_hpa"]);

        let deployment = mock.deployment("default", &name).unwrap();
        assert_eq!(deployment.spec.as_ref().unwrap().replicas, Some(1));
        let hpa = mock.hpa("default", &name).unwrap();
        let spec = hpa.spec.unwrap();
        assert_eq!(spec.min_replicas, Some(1));
        assert_eq!(spec.max_replicas, 5);

        let cached = executor.get_func_svc_from_cache(&function).unwrap();
        assert_eq!(cached.address, fsvc.address);
        assert_eq!(
            executor.metrics().cold_starts.with_label_values(&["f1", "default"]).get(),
            1
        );
    }

    #[tokio::test]
    async fn test_concurrent_creation_is_single_flight() {
        let mock = MockClusterClient::new();
        mock.set_create_delay(Duration::from_millis(50));
        let executor = test_executor(&mock);
        let function = container_function("f1", "default", "u1");

        let results = join_all((0..5).map(|_| executor.get_func_svc(&function))).await;

        let addresses: Vec<String> = results.into_iter().map(|r| r.unwrap().address).collect();
        assert!(addresses.iter().all(|a| *a == addresses[0]));
        assert_eq!(mock.call_count("create_service"), 1);
        assert_eq!(mock.call_count("create_deployment"), 1);
        assert_eq!(mock.call_count("create_hpa"), 1);
        assert_eq!(executor.fs_cache().len(), 1);
    }

    #[tokio::test]
    async fn test_second_lookup_reads_cache() {
        let mock = MockClusterClient::new();
        let executor = test_executor(&mock);
        let function = container_function("f1", "default", "u1");

        let first = executor.get_func_svc(&function).await.unwrap();
        let second = executor.get_func_svc(&function).await.unwrap();

        assert_eq!(first.address, second.address);
        assert_eq!(mock.call_count("create_deployment"), 1);
        assert_eq!(mock.deployment_count(), 1);
    }

    #[tokio::test]
    async fn test_creation_failure_cleans_up_and_allows_retry() {
        let mock = MockClusterClient::new();
        mock.fail_on("create_deployment");
        let executor = test_executor(&mock);
        let function = container_function("f1", "default", "u1");

        let err = executor.get_func_svc(&function).await.unwrap_err();
        assert!(matches!(err, ControllerError::FunctionCreation { .. }));
        assert!(err.to_string().contains("error creating Deployment"));
        assert!(executor.fs_cache().is_empty());
        assert!(eventually(|| mock.service_count() == 0).await);
        assert_eq!(
            executor
                .metrics()
                .cold_start_errors
                .with_label_values(&["f1", "default"])
                .get(),
            1
        );

        mock.clear_failure("create_deployment");
        let fsvc = executor.get_func_svc(&function).await.unwrap();
        assert_eq!(fsvc.name, name_of(&function));
        assert_eq!(mock.deployment_count(), 1);
        assert_eq!(mock.hpa_count(), 1);
    }

    #[tokio::test]
    async fn test_creation_reuses_existing_objects_after_restart() {
        let mock = MockClusterClient::new();
        let function = container_function("f1", "default", "u1");
        test_executor(&mock).get_func_svc(&function).await.unwrap();

        let restarted = test_executor(&mock);
        let fsvc = restarted.get_func_svc(&function).await.unwrap();

        assert_eq!(fsvc.name, name_of(&function));
        assert_eq!(mock.call_count("create_service"), 1);
        assert_eq!(mock.call_count("create_deployment"), 1);
        assert_eq!(mock.call_count("create_hpa"), 1);
        assert!(restarted.get_func_svc_from_cache(&function).is_ok());
    }

    #[tokio::test]
    async fn test_create_rejects_other_executor_types() {
        let mock = MockClusterClient::new();
        let executor = test_executor(&mock);
        let mut function = container_function("f1", "default", "u1");
        function.spec.invoke_strategy.execution_strategy.executor_type = ExecutorType::Newdeploy;

        let err = executor.get_func_svc(&function).await.unwrap_err();
        assert!(matches!(err, ControllerError::InvalidFunction(_)));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_reports_every_validation_problem() {
        let mock = MockClusterClient::new();
        let executor = test_executor(&mock);
        let mut function = container_function("f1", "default", "u1");
        function.spec.pod_spec = None;
        function.spec.invoke_strategy.execution_strategy.min_scale = -1;

        let err = executor.get_func_svc(&function).await.unwrap_err();
        assert!(err.is_invalid_function());
        match &err {
            ControllerError::Multiple(errors) => assert_eq!(errors.len(), 2),
            other => panic!("expected collected errors, got {}", other),
        }
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_secret_names_the_reference() {
        let mock = MockClusterClient::new();
        let executor = test_executor(&mock);
        let mut function = container_function("f1", "default", "u1");
        function.spec.secrets = vec![SecretReference::new("db")];

        let err = executor.get_func_svc(&function).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("error reading Secret default/db"));
        assert!(eventually(|| mock.service_count() == 0).await);
    }

    #[tokio::test]
    async fn test_update_max_scale_patches_only_hpa() {
        let mock = MockClusterClient::new();
        let executor = test_executor(&mock);
        let old = container_function("f1", "default", "u1");
        executor.get_func_svc(&old).await.unwrap();
        let name = name_of(&old);
        let deployment_before = mock.deployment("default", &name).unwrap();
        mock.clear_calls();

        let mut new = next_revision(&old, "2");
        new.spec.invoke_strategy.execution_strategy.max_scale = 10;
        executor.update_function(&old, &new).await.unwrap();

        assert_eq!(mock.call_count("patch_hpa"), 1);
        assert_eq!(mock.call_count("replace_deployment"), 0);
        assert_eq!(mock.call_count("patch_deployment"), 0);
        let hpa = mock.hpa("default", &name).unwrap();
        let spec = hpa.spec.unwrap();
        assert_eq!(spec.max_replicas, 10);
        assert_eq!(spec.min_replicas, Some(1));
        assert_eq!(mock.deployment("default", &name).unwrap(), deployment_before);
    }

    #[tokio::test]
    async fn test_update_pod_spec_preserves_current_replicas() {
        let mock = MockClusterClient::new();
        let executor = test_executor(&mock);
        let old = container_function("f1", "default", "u1");
        executor.get_func_svc(&old).await.unwrap();
        let name = name_of(&old);
        mock.scale_deployment("default", &name, 3).await.unwrap();

        let mut new = next_revision(&old, "2");
        if let Some(pod) = new.spec.pod_spec.as_mut() {
            pod.containers[0].image = Some("ghcr.io/funcd/hello:2.0".to_string());
        }
        executor.update_function(&old, &new).await.unwrap();

        assert_eq!(mock.call_count("replace_deployment"), 1);
        assert_eq!(mock.call_count("patch_hpa"), 0);
        let deployment = mock.deployment("default", &name).unwrap();
        let spec = deployment.spec.unwrap();
        assert_eq!(spec.replicas, Some(3));
        let pod = spec.template.spec.unwrap();
        assert_eq!(pod.containers[0].image.as_deref(), Some("ghcr.io/funcd/hello:2.0"));
    }

    #[tokio::test]
    async fn test_update_secrets_recomputes_rv_count() {
        let mock = MockClusterClient::new();
        mock.add_secret(secret("default", "db", "10"));
        mock.add_config_map(config_map("shared", "settings", "32"));
        let executor = test_executor(&mock);
        let old = container_function("f1", "default", "u1");
        executor.get_func_svc(&old).await.unwrap();
        let name = name_of(&old);
        assert_eq!(
            rv_count_env(&mock.deployment("default", &name).unwrap(), "f1").as_deref(),
            Some("0")
        );

        let mut new = next_revision(&old, "2");
        new.spec.secrets = vec![SecretReference::new("db")];
        new.spec.config_maps = vec![ConfigMapReference {
            name: "settings".to_string(),
            namespace: Some("shared".to_string()),
        }];
        executor.update_function(&old, &new).await.unwrap();

        assert_eq!(
            rv_count_env(&mock.deployment("default", &name).unwrap(), "f1").as_deref(),
            Some("42")
        );
    }

    #[tokio::test]
    async fn test_update_with_same_resource_version_is_noop() {
        let mock = MockClusterClient::new();
        let executor = test_executor(&mock);
        let old = container_function("f1", "default", "u1");
        let mut new = old.clone();
        new.spec.invoke_strategy.execution_strategy.max_scale = 10;

        executor.update_function(&old, &new).await.unwrap();
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_update_out_of_container_deletes_backend() {
        let mock = MockClusterClient::new();
        let executor = test_executor(&mock);
        let old = container_function("f1", "default", "u1");
        executor.get_func_svc(&old).await.unwrap();

        let mut new = next_revision(&old, "2");
        new.spec.invoke_strategy.execution_strategy.executor_type = ExecutorType::Poolmgr;
        executor.update_function(&old, &new).await.unwrap();

        assert_eq!(mock.service_count(), 0);
        assert_eq!(mock.deployment_count(), 0);
        assert_eq!(mock.hpa_count(), 0);
        assert!(executor.fs_cache().is_empty());
    }

    #[tokio::test]
    async fn test_update_into_container_creates_backend() {
        let mock = MockClusterClient::new();
        let executor = test_executor(&mock);
        let new = container_function("f1", "default", "u1");
        let mut old = new.clone();
        old.metadata.resource_version = Some("0".to_string());
        old.spec.invoke_strategy.execution_strategy.executor_type = ExecutorType::Poolmgr;

        executor.update_function(&old, &new).await.unwrap();

        assert_eq!(mock.deployment_count(), 1);
        assert!(executor.get_func_svc_from_cache(&new).is_ok());
    }

    #[tokio::test]
    async fn test_update_between_other_executors_is_ignored() {
        let mock = MockClusterClient::new();
        let executor = test_executor(&mock);
        let mut old = container_function("f1", "default", "u1");
        old.spec.invoke_strategy.execution_strategy.executor_type = ExecutorType::Poolmgr;
        let mut new = next_revision(&old, "2");
        new.spec.invoke_strategy.execution_strategy.executor_type = ExecutorType::Newdeploy;

        executor.update_function(&old, &new).await.unwrap();
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_function_removes_objects_and_cache_entry() {
        let mock = MockClusterClient::new();
        let executor = test_executor(&mock);
        let function = container_function("f1", "default", "u1");
        executor.get_func_svc(&function).await.unwrap();

        executor.delete_function(&function).await.unwrap();

        assert_eq!(mock.service_count(), 0);
        assert_eq!(mock.deployment_count(), 0);
        assert_eq!(mock.hpa_count(), 0);
        assert!(executor.get_func_svc_from_cache(&function).unwrap_err().is_not_found());
        assert_eq!(executor.throttler.len(), 0);

        // Nothing left to delete is not an error
        executor.delete_function(&function).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_function_aggregates_failures() {
        let mock = MockClusterClient::new();
        let executor = test_executor(&mock);
        let function = container_function("f1", "default", "u1");
        executor.get_func_svc(&function).await.unwrap();
        mock.fail_on("delete_hpa");
        mock.fail_on("delete_service");

        let err = executor.delete_function(&function).await.unwrap_err();
        match err {
            ControllerError::Multiple(errors) => assert_eq!(errors.len(), 2),
            other => panic!("expected aggregated errors, got {}", other),
        }
        // The deployment delete still went through
        assert_eq!(mock.deployment_count(), 0);
    }

    #[tokio::test]
    async fn test_is_valid() {
        let mock = MockClusterClient::new();
        let executor = test_executor(&mock);
        let function = container_function("f1", "default", "u1");
        let fsvc = executor.get_func_svc(&function).await.unwrap();
        assert!(executor.is_valid(&fsvc).await);

        mock.set_available_replicas("default", &fsvc.name, 0);
        assert!(!executor.is_valid(&fsvc).await);

        mock.set_available_replicas("default", &fsvc.name, 1);
        assert!(executor.is_valid(&fsvc).await);

        mock.remove_deployment("default", &fsvc.name);
        assert!(!executor.is_valid(&fsvc).await);

        let mut empty = fsvc.clone();
        empty.kubernetes_objects.clear();
        assert!(!executor.is_valid(&empty).await);
    }

    #[tokio::test]
    async fn test_delete_func_svc_from_cache_allows_fresh_lookup() {
        let mock = MockClusterClient::new();
        let executor = test_executor(&mock);
        let function = container_function("f1", "default", "u1");
        let fsvc = executor.get_func_svc(&function).await.unwrap();

        executor.delete_func_svc_from_cache(&fsvc);
        assert!(executor.fs_cache().is_empty());

        let again = executor.get_func_svc(&function).await.unwrap();
        assert_eq!(again.address, fsvc.address);
        assert_eq!(executor.fs_cache().len(), 1);
        assert_eq!(mock.call_count("create_deployment"), 1);
    }

    #[tokio::test]
    async fn test_tap_service_refreshes_access_time() {
        let mock = MockClusterClient::new();
        let executor = test_executor(&mock);
        let function = container_function("f1", "default", "u1");
        let fsvc = executor.get_func_svc(&function).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        let before_tap = chrono::Utc::now();
        executor.tap_service(&fsvc.address).await.unwrap();

        let entries = executor.fs_cache().entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].atime >= before_tap);
        assert!(executor.tap_service("nowhere.default").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_refresh_func_pods_sets_rv_count() {
        let mock = MockClusterClient::new();
        mock.add_secret(secret("default", "db", "5"));
        let executor = test_executor(&mock);
        let mut function = container_function("f1", "default", "u1");
        function.spec.secrets = vec![SecretReference::new("db")];
        let fsvc = executor.get_func_svc(&function).await.unwrap();
        assert_eq!(
            rv_count_env(&mock.deployment("default", &fsvc.name).unwrap(), "f1").as_deref(),
            Some("5")
        );

        mock.add_secret(secret("default", "db", "9"));
        executor.refresh_func_pods(&function).await.unwrap();

        assert_eq!(mock.call_count("patch_deployment"), 1);
        let deployment = mock.deployment("default", &fsvc.name).unwrap();
        assert_eq!(rv_count_env(&deployment, "f1").as_deref(), Some("9"));
        let pod = deployment.spec.unwrap().template.spec.unwrap();
        assert_eq!(pod.containers.len(), 1);
        assert_eq!(pod.containers[0].image.as_deref(), Some("ghcr.io/funcd/hello:1.0"));
    }

    #[tokio::test]
    async fn test_refresh_functions_referencing_secret() {
        let mock = MockClusterClient::new();
        mock.add_secret(secret("default", "db", "5"));
        let executor = test_executor(&mock);

        let mut mounting = container_function("f1", "default", "u1");
        mounting.spec.secrets = vec![SecretReference::new("db")];
        let other = container_function("f2", "default", "u2");
        mock.add_function(mounting.clone());
        mock.add_function(other.clone());
        executor.get_func_svc(&mounting).await.unwrap();
        executor.get_func_svc(&other).await.unwrap();

        let refreshed = executor
            .refresh_functions_referencing(ReferenceKind::Secret, "default", "db")
            .await
            .unwrap();
        assert_eq!(refreshed, 1);

        let refreshed = executor
            .refresh_functions_referencing(ReferenceKind::ConfigMap, "default", "db")
            .await
            .unwrap();
        assert_eq!(refreshed, 0);
    }

    #[tokio::test]
    async fn test_adopt_existing_resources_only_takes_container_functions() {
        let mock = MockClusterClient::new();
        let container = container_function("f1", "default", "u1");
        let mut pool = container_function("f2", "default", "u2");
        pool.spec.invoke_strategy.execution_strategy.executor_type = ExecutorType::Poolmgr;
        mock.add_function(container.clone());
        mock.add_function(pool.clone());
        test_executor(&mock).get_func_svc(&container).await.unwrap();

        let restarted = test_executor(&mock);
        restarted.adopt_existing_resources().await;

        assert_eq!(restarted.fs_cache().len(), 1);
        assert!(restarted.get_func_svc_from_cache(&container).is_ok());
        assert!(restarted.get_func_svc_from_cache(&pool).is_err());
        assert_eq!(mock.call_count("create_deployment"), 1);
    }

    #[tokio::test]
    async fn test_cleanup_old_executor_objects_removes_foreign_objects_only() {
        let mock = MockClusterClient::new();
        let function = container_function("f1", "default", "u1");
        test_executor(&mock).get_func_svc(&function).await.unwrap();

        // Same instance: nothing is foreign
        test_executor(&mock).cleanup_old_executor_objects().await;
        assert_eq!(mock.deployment_count(), 1);

        let other = test_executor_with_config(
            &mock,
            ExecutorConfig {
                instance_id: "next-instance".to_string(),
                ..test_config()
            },
        );
        other.cleanup_old_executor_objects().await;

        assert_eq!(mock.service_count(), 0);
        assert_eq!(mock.deployment_count(), 0);
        assert_eq!(mock.hpa_count(), 0);
    }

    #[tokio::test]
    async fn test_dump_debug_info_writes_cache_entries() {
        let mock = MockClusterClient::new();
        let dir = std::env::temp_dir().join(format!("container-executor-{}", uuid::Uuid::new_v4()));
        let executor = test_executor_with_config(
            &mock,
            ExecutorConfig {
                dump_dir: dir.clone(),
                ..test_config()
            },
        );
        let fsvc = executor
            .get_func_svc(&container_function("f1", "default", "u1"))
            .await
            .unwrap();

        let path = executor.dump_debug_info().await.unwrap();
        assert!(path.starts_with(&dir));
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains(&fsvc.address));
        assert!(contents.contains("Deployment"));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
