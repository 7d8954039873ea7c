//! Resource kinds that live outside any namespace

/// Built-in kinds whose objects are cluster scoped
const CLUSTER_SCOPED_KINDS: &[&str] = &[
    "APIService",
    "CertificateSigningRequest",
    "ClusterRole",
    "ClusterRoleBinding",
    "ComponentStatus",
    "CSIDriver",
    "CSINode",
    "CustomResourceDefinition",
    "IngressClass",
    "MutatingWebhookConfiguration",
    "Namespace",
    "Node",
    "PersistentVolume",
    "PriorityClass",
    "RuntimeClass",
    "StorageClass",
    "ValidatingWebhookConfiguration",
    "VolumeAttachment",
];

/// Check if objects of `kind` are cluster scoped (and so stored without a
/// namespace)
pub fn is_cluster_scoped(kind: &str) -> bool {
    CLUSTER_SCOPED_KINDS.contains(&kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_scoped_kinds() {
        assert!(is_cluster_scoped("Node"));
        assert!(is_cluster_scoped("Namespace"));
        assert!(is_cluster_scoped("PersistentVolume"));
        assert!(!is_cluster_scoped("Pod"));
        assert!(!is_cluster_scoped("PersistentVolumeClaim"));
        assert!(!is_cluster_scoped("node"));
    }
}
