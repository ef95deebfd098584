//! Process-wide registry mapping kind names to their API coordinates.
//!
//! The registry is seeded with the standard Kubernetes kinds and is
//! append-only after process init: registering a name twice is an error,
//! never a silent overwrite. Custom resources must be registered before
//! their first use through the fluent entry point.

use std::{collections::BTreeMap, sync::LazyLock};

use parking_lot::RwLock;

use crate::{gvk::GroupVersionKind, Error, Result};

static REGISTRY: LazyLock<RwLock<BTreeMap<String, GroupVersionKind>>> =
    LazyLock::new(|| RwLock::new(builtins()));

fn entry(map: &mut BTreeMap<String, GroupVersionKind>, gvk: GroupVersionKind) {
    map.insert(gvk.kind.clone(), gvk);
}

/// The default table of well-known kinds.
///
/// Plurals are spelled out where `lowercase(kind) + "s"` is wrong.
fn builtins() -> BTreeMap<String, GroupVersionKind> {
    let mut map = BTreeMap::new();
    // core group
    for kind in [
        "Pod",
        "Service",
        "Node",
        "Namespace",
        "Secret",
        "ConfigMap",
        "ServiceAccount",
        "LimitRange",
        "ResourceQuota",
        "PersistentVolume",
        "PersistentVolumeClaim",
        "ReplicationController",
        "Event",
    ] {
        entry(&mut map, GroupVersionKind::gvk("", "v1", kind));
    }
    entry(&mut map, GroupVersionKind::gvk("", "v1", "Endpoints").plural("endpoints"));

    // apps
    for kind in ["Deployment", "ReplicaSet", "StatefulSet", "DaemonSet"] {
        entry(&mut map, GroupVersionKind::gvk("apps", "v1", kind));
    }
    // batch
    entry(&mut map, GroupVersionKind::gvk("batch", "v1", "Job"));
    entry(&mut map, GroupVersionKind::gvk("batch", "v1", "CronJob"));
    // autoscaling
    entry(
        &mut map,
        GroupVersionKind::gvk("autoscaling", "v2", "HorizontalPodAutoscaler"),
    );
    // networking
    entry(
        &mut map,
        GroupVersionKind::gvk("networking.k8s.io", "v1", "Ingress").plural("ingresses"),
    );
    entry(
        &mut map,
        GroupVersionKind::gvk("networking.k8s.io", "v1", "IngressClass").plural("ingressclasses"),
    );
    entry(
        &mut map,
        GroupVersionKind::gvk("networking.k8s.io", "v1", "NetworkPolicy").plural("networkpolicies"),
    );
    // rbac
    for kind in ["Role", "RoleBinding", "ClusterRole", "ClusterRoleBinding"] {
        entry(
            &mut map,
            GroupVersionKind::gvk("rbac.authorization.k8s.io", "v1", kind),
        );
    }
    // policy / scheduling / storage
    entry(
        &mut map,
        GroupVersionKind::gvk("policy", "v1", "PodDisruptionBudget"),
    );
    entry(
        &mut map,
        GroupVersionKind::gvk("scheduling.k8s.io", "v1", "PriorityClass").plural("priorityclasses"),
    );
    entry(
        &mut map,
        GroupVersionKind::gvk("storage.k8s.io", "v1", "StorageClass").plural("storageclasses"),
    );
    // apiextensions / admission
    entry(
        &mut map,
        GroupVersionKind::gvk("apiextensions.k8s.io", "v1", "CustomResourceDefinition"),
    );
    entry(
        &mut map,
        GroupVersionKind::gvk("admissionregistration.k8s.io", "v1", "MutatingWebhookConfiguration"),
    );
    entry(
        &mut map,
        GroupVersionKind::gvk(
            "admissionregistration.k8s.io",
            "v1",
            "ValidatingWebhookConfiguration",
        ),
    );
    map
}

/// Register a custom kind under `kind_name`.
///
/// Fails with [`Error::AlreadyRegistered`] when the name is taken (built-ins
/// included); the registry is append-only.
pub fn register(kind_name: &str, gvk: GroupVersionKind) -> Result<()> {
    let mut reg = REGISTRY.write();
    if reg.contains_key(kind_name) {
        return Err(Error::AlreadyRegistered(kind_name.to_string()));
    }
    reg.insert(kind_name.to_string(), gvk);
    Ok(())
}

/// Resolve a kind name to its [`GroupVersionKind`].
///
/// Fails with [`Error::UnknownKind`] when the name is neither built-in nor
/// previously registered.
pub fn lookup(kind_name: &str) -> Result<GroupVersionKind> {
    REGISTRY
        .read()
        .get(kind_name)
        .cloned()
        .ok_or_else(|| Error::UnknownKind(kind_name.to_string()))
}
