//! Resource types offered by the simulated cloud

use strata_core::{AttributeSchema, ResourceSchema};

pub const VPC: &str = "vpc";
pub const SUBNET: &str = "subnet";
pub const IAM_ROLE: &str = "iam_role";
pub const LAUNCH_TEMPLATE: &str = "launch_template";
pub const EKS_CLUSTER: &str = "eks_cluster";
pub const NODE_GROUP: &str = "node_group";

pub const RESOURCE_TYPES: &[&str] = &[VPC, SUBNET, IAM_ROLE, LAUNCH_TEMPLATE, EKS_CLUSTER, NODE_GROUP];

/// Prefix of ids handed out for a resource type
pub fn id_prefix(resource_type: &str) -> &'static str {
    match resource_type {
        VPC => "vpc",
        SUBNET => "subnet",
        IAM_ROLE => "role",
        LAUNCH_TEMPLATE => "lt",
        EKS_CLUSTER => "eks",
        NODE_GROUP => "ng",
        _ => "res",
    }
}

fn base(resource_type: &str) -> ResourceSchema {
    ResourceSchema::new(resource_type)
        .attribute("id", AttributeSchema::computed())
        .attribute("arn", AttributeSchema::computed())
        .attribute("tags", AttributeSchema::in_place())
}

pub fn schema(resource_type: &str) -> Option<ResourceSchema> {
    let schema = match resource_type {
        VPC => base(VPC)
            .attribute("cidr_block", AttributeSchema::replace().required())
            .attribute("enable_dns_hostnames", AttributeSchema::in_place())
            .attribute("instance_tenancy", AttributeSchema::unclassified()),
        SUBNET => base(SUBNET)
            .attribute("vpc_id", AttributeSchema::replace().required())
            .attribute("cidr_block", AttributeSchema::replace().required())
            .attribute("availability_zone", AttributeSchema::replace())
            .attribute("map_public_ip_on_launch", AttributeSchema::in_place()),
        IAM_ROLE => base(IAM_ROLE)
            .attribute("name", AttributeSchema::replace().required())
            .attribute("assume_role_policy", AttributeSchema::in_place().required())
            .attribute("policy_arns", AttributeSchema::in_place()),
        LAUNCH_TEMPLATE => base(LAUNCH_TEMPLATE)
            .with_create_before_destroy(true)
            .attribute("latest_version", AttributeSchema::computed())
            .attribute("image_id", AttributeSchema::replace().required())
            .attribute("instance_type", AttributeSchema::replace().required())
            .attribute("security_group_ids", AttributeSchema::replace())
            .attribute("user_data", AttributeSchema::replace()),
        EKS_CLUSTER => base(EKS_CLUSTER)
            .attribute("endpoint", AttributeSchema::computed())
            .attribute("name", AttributeSchema::replace().required())
            .attribute("role_arn", AttributeSchema::replace().required())
            .attribute("subnet_ids", AttributeSchema::replace().required())
            .attribute("version", AttributeSchema::in_place()),
        NODE_GROUP => base(NODE_GROUP)
            .attribute("status", AttributeSchema::computed())
            .attribute("cluster_name", AttributeSchema::replace().required())
            .attribute("node_role_arn", AttributeSchema::replace().required())
            .attribute("subnet_ids", AttributeSchema::replace().required())
            .attribute("launch_template_id", AttributeSchema::in_place())
            .attribute("instance_types", AttributeSchema::replace())
            .attribute("desired_size", AttributeSchema::in_place())
            .attribute("min_size", AttributeSchema::in_place())
            .attribute("max_size", AttributeSchema::in_place()),
        _ => return None,
    };
    Some(schema)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_type_has_a_schema() {
        for resource_type in RESOURCE_TYPES {
            let schema = schema(resource_type).unwrap();
            assert_eq!(schema.resource_type, *resource_type);
            assert!(schema.is_computed("id"));
            assert!(schema.is_computed("arn"));
        }
        assert!(schema("bucket").is_none());
    }

    #[test]
    fn test_only_launch_template_defaults_to_create_before_destroy() {
        for resource_type in RESOURCE_TYPES {
            let cbd = schema(resource_type).unwrap().create_before_destroy;
            assert_eq!(cbd, *resource_type == LAUNCH_TEMPLATE, "{}", resource_type);
        }
    }
}
