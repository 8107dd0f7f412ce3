//! ARM resource identifiers
//!
//! Every ARM object is addressed by a path of key/value segments:
//! `/subscriptions/{id}/resourceGroups/{name}/providers/{namespace}/{type}/{name}[/{type}/{name}]`.
//! The typed ids below are what resources persist as their state id.

use std::fmt;

/// Why an id could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdParseError {
    #[error("ID was empty")]
    Empty,

    #[error("ID {0:?} must start with a '/'")]
    NoLeadingSlash(String),

    #[error("ID {0:?} should have an even number of segments")]
    OddSegments(String),

    #[error("ID {0:?} contains an empty segment")]
    EmptySegment(String),

    #[error("ID {0:?} must start with /subscriptions/{{subscriptionId}}")]
    MissingSubscription(String),

    #[error("parsing {kind} ID {id:?}: expected the format {expected:?}")]
    WrongShape {
        kind: &'static str,
        id: String,
        expected: String,
    },
}

/// Loosely parsed id: an ordered list of key/value segments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceId {
    pub segments: Vec<(String, String)>,
}

impl ResourceId {
    pub fn parse(input: &str) -> Result<Self, IdParseError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(IdParseError::Empty);
        }
        let Some(path) = trimmed.strip_prefix('/') else {
            return Err(IdParseError::NoLeadingSlash(input.to_string()));
        };

        let parts: Vec<&str> = path.trim_end_matches('/').split('/').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(IdParseError::EmptySegment(input.to_string()));
        }
        if parts.len() % 2 != 0 {
            return Err(IdParseError::OddSegments(input.to_string()));
        }

        let segments: Vec<(String, String)> = parts
            .chunks(2)
            .map(|pair| (pair[0].to_string(), pair[1].to_string()))
            .collect();

        match segments.first() {
            Some((key, _)) if key.eq_ignore_ascii_case("subscriptions") => Ok(Self { segments }),
            _ => Err(IdParseError::MissingSubscription(input.to_string())),
        }
    }

    /// Value of the first segment with this key (case-insensitive)
    pub fn get(&self, key: &str) -> Option<&str> {
        self.segments
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn subscription_id(&self) -> &str {
        self.segments.first().map(|(_, v)| v.as_str()).unwrap_or_default()
    }

    pub fn resource_group_name(&self) -> Option<&str> {
        self.get("resourceGroups")
    }

    /// Name of the addressed object (the last value)
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(|(_, v)| v.as_str())
    }
}

/// Match an id against a fixed segment layout and return its variable values
///
/// Values come back in order: subscription, resource group, then one per
/// entry of `segments`. The provider namespace itself is not returned.
fn parse_scoped(
    input: &str,
    kind: &'static str,
    provider: Option<&str>,
    segments: &[&str],
    insensitive: bool,
) -> Result<Vec<String>, IdParseError> {
    let parsed = ResourceId::parse(input)?;

    let mut expected_keys = vec!["subscriptions", "resourceGroups"];
    if provider.is_some() {
        expected_keys.push("providers");
    }
    expected_keys.extend_from_slice(segments);

    let wrong_shape = || IdParseError::WrongShape {
        kind,
        id: input.to_string(),
        expected: expected_format(provider, segments),
    };

    if parsed.segments.len() != expected_keys.len() {
        return Err(wrong_shape());
    }

    let keys_match = |actual: &str, expected: &str| {
        if insensitive {
            actual.eq_ignore_ascii_case(expected)
        } else {
            actual == expected
        }
    };

    let mut values = Vec::with_capacity(expected_keys.len());
    for ((key, value), expected) in parsed.segments.into_iter().zip(expected_keys) {
        if !keys_match(&key, expected) {
            return Err(wrong_shape());
        }
        if expected == "providers" {
            if let Some(namespace) = provider {
                if !keys_match(&value, namespace) {
                    return Err(wrong_shape());
                }
            }
            continue;
        }
        values.push(value);
    }

    Ok(values)
}

fn expected_format(provider: Option<&str>, segments: &[&str]) -> String {
    let mut out = "/subscriptions/{subscriptionId}/resourceGroups/{resourceGroupName}".to_string();
    if let Some(namespace) = provider {
        out.push_str("/providers/");
        out.push_str(namespace);
    }
    for segment in segments {
        out.push_str(&format!("/{}/{{{}Name}}", segment, segment.trim_end_matches('s')));
    }
    out
}

/// Resource group: `/subscriptions/{sub}/resourceGroups/{name}`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceGroupId {
    pub subscription_id: String,
    pub resource_group_name: String,
}

impl ResourceGroupId {
    pub fn new(subscription_id: &str, resource_group_name: &str) -> Self {
        Self {
            subscription_id: subscription_id.to_string(),
            resource_group_name: resource_group_name.to_string(),
        }
    }

    pub fn parse(input: &str) -> Result<Self, IdParseError> {
        Self::parse_with(input, false)
    }

    pub fn parse_insensitively(input: &str) -> Result<Self, IdParseError> {
        Self::parse_with(input, true)
    }

    fn parse_with(input: &str, insensitive: bool) -> Result<Self, IdParseError> {
        let mut values = parse_scoped(input, "Resource Group", None, &[], insensitive)?.into_iter();
        Ok(Self {
            subscription_id: values.next().unwrap_or_default(),
            resource_group_name: values.next().unwrap_or_default(),
        })
    }

    pub fn id(&self) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}",
            self.subscription_id, self.resource_group_name
        )
    }
}

impl fmt::Display for ResourceGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Resource Group (Subscription: {:?} / Resource Group Name: {:?})",
            self.subscription_id, self.resource_group_name
        )
    }
}

/// Declares an id type scoped to a resource group and provider namespace
macro_rules! provider_resource_id {
    (
        $(#[$doc:meta])*
        $name:ident {
            kind: $kind:literal,
            provider: $provider:literal,
            segments: [$(($field:ident, $segment:literal, $label:literal)),+ $(,)?] $(,)?
        }
    ) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name {
            pub subscription_id: String,
            pub resource_group_name: String,
            $(pub $field: String,)+
        }

        impl $name {
            pub fn new(subscription_id: &str, resource_group_name: &str, $($field: &str),+) -> Self {
                Self {
                    subscription_id: subscription_id.to_string(),
                    resource_group_name: resource_group_name.to_string(),
                    $($field: $field.to_string(),)+
                }
            }

            pub fn parse(input: &str) -> Result<Self, IdParseError> {
                Self::parse_with(input, false)
            }

            /// Accepts ids whose segment keys differ in case, as some APIs return them
            pub fn parse_insensitively(input: &str) -> Result<Self, IdParseError> {
                Self::parse_with(input, true)
            }

            fn parse_with(input: &str, insensitive: bool) -> Result<Self, IdParseError> {
                let mut values = parse_scoped(
                    input,
                    $kind,
                    Some($provider),
                    &[$($segment),+],
                    insensitive,
                )?
                .into_iter();

                Ok(Self {
                    subscription_id: values.next().unwrap_or_default(),
                    resource_group_name: values.next().unwrap_or_default(),
                    $($field: values.next().unwrap_or_default(),)+
                })
            }

            pub fn id(&self) -> String {
                let mut id = format!(
                    "/subscriptions/{}/resourceGroups/{}/providers/{}",
                    self.subscription_id, self.resource_group_name, $provider
                );
                $(
                    id.push('/');
                    id.push_str($segment);
                    id.push('/');
                    id.push_str(&self.$field);
                )+
                id
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let components = [
                    format!("Subscription: {:?}", self.subscription_id),
                    format!("Resource Group Name: {:?}", self.resource_group_name),
                    $(format!("{}: {:?}", $label, self.$field),)+
                ];
                write!(f, "{} ({})", $kind, components.join(" / "))
            }
        }
    };
}

provider_resource_id!(
    NetworkInterfaceId {
        kind: "Network Interface",
        provider: "Microsoft.Network",
        segments: [(network_interface_name, "networkInterfaces", "Network Interface Name")],
    }
);

provider_resource_id!(
    SubnetId {
        kind: "Subnet",
        provider: "Microsoft.Network",
        segments: [
            (virtual_network_name, "virtualNetworks", "Virtual Network Name"),
            (subnet_name, "subnets", "Subnet Name"),
        ],
    }
);

provider_resource_id!(
    PublicIpAddressId {
        kind: "Public IP Address",
        provider: "Microsoft.Network",
        segments: [(public_ip_address_name, "publicIPAddresses", "Public IP Address Name")],
    }
);

provider_resource_id!(
    LoadBalancerId {
        kind: "Load Balancer",
        provider: "Microsoft.Network",
        segments: [(load_balancer_name, "loadBalancers", "Load Balancer Name")],
    }
);

provider_resource_id!(
    FrontendIpConfigurationId {
        kind: "Frontend IP Configuration",
        provider: "Microsoft.Network",
        segments: [
            (load_balancer_name, "loadBalancers", "Load Balancer Name"),
            (frontend_ip_configuration_name, "frontendIPConfigurations", "Frontend IP Configuration Name"),
        ],
    }
);

provider_resource_id!(
    RedisId {
        kind: "Redis Cache",
        provider: "Microsoft.Cache",
        segments: [(redis_name, "redis", "Redis Name")],
    }
);

provider_resource_id!(
    WorkflowId {
        kind: "Logic App Workflow",
        provider: "Microsoft.Logic",
        segments: [(workflow_name, "workflows", "Workflow Name")],
    }
);

provider_resource_id!(
    SqlServerId {
        kind: "SQL Server",
        provider: "Microsoft.Sql",
        segments: [(server_name, "servers", "Server Name")],
    }
);

provider_resource_id!(
    SqlDatabaseId {
        kind: "SQL Database",
        provider: "Microsoft.Sql",
        segments: [
            (server_name, "servers", "Server Name"),
            (database_name, "databases", "Database Name"),
        ],
    }
);

impl SqlDatabaseId {
    pub fn server_id(&self) -> SqlServerId {
        SqlServerId::new(&self.subscription_id, &self.resource_group_name, &self.server_name)
    }
}

impl SubnetId {
    /// Lock key of the parent virtual network
    pub fn virtual_network_lock_name(&self) -> &str {
        &self.virtual_network_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUB: &str = "00000000-0000-0000-0000-000000000000";

    #[test]
    fn test_generic_parse() {
        let id = ResourceId::parse(&format!(
            "/subscriptions/{}/resourceGroups/rg1/providers/Microsoft.Cache/redis/cache1",
            SUB
        ))
        .unwrap();
        assert_eq!(id.subscription_id(), SUB);
        assert_eq!(id.resource_group_name(), Some("rg1"));
        assert_eq!(id.get("REDIS"), Some("cache1"));
        assert_eq!(id.name(), Some("cache1"));
    }

    #[test]
    fn test_generic_parse_errors() {
        assert_eq!(ResourceId::parse(""), Err(IdParseError::Empty));
        assert!(matches!(
            ResourceId::parse("subscriptions/x"),
            Err(IdParseError::NoLeadingSlash(_))
        ));
        assert!(matches!(
            ResourceId::parse("/subscriptions/x/resourceGroups"),
            Err(IdParseError::OddSegments(_))
        ));
        assert!(matches!(
            ResourceId::parse("/subscriptions//resourceGroups/rg"),
            Err(IdParseError::EmptySegment(_))
        ));
        assert!(matches!(
            ResourceId::parse("/tenants/x"),
            Err(IdParseError::MissingSubscription(_))
        ));
    }

    #[test]
    fn test_resource_group_id() {
        let id = ResourceGroupId::new(SUB, "rg1");
        assert_eq!(id.id(), format!("/subscriptions/{}/resourceGroups/rg1", SUB));
        assert_eq!(ResourceGroupId::parse(&id.id()).unwrap(), id);
        assert!(ResourceGroupId::parse(&format!("{}/providers/Microsoft.Cache/redis/x", id.id())).is_err());
    }

    #[test]
    fn test_typed_id_formats_segments() {
        let id = SubnetId::new(SUB, "rg1", "vnet1", "subnet1");
        assert_eq!(
            id.id(),
            format!(
                "/subscriptions/{}/resourceGroups/rg1/providers/Microsoft.Network/virtualNetworks/vnet1/subnets/subnet1",
                SUB
            )
        );
        assert_eq!(SubnetId::parse(&id.id()).unwrap(), id);
    }

    #[test]
    fn test_typed_id_rejects_other_types() {
        let nic = NetworkInterfaceId::new(SUB, "rg1", "nic1");
        let err = RedisId::parse(&nic.id()).unwrap_err();
        assert!(matches!(err, IdParseError::WrongShape { kind: "Redis Cache", .. }));
    }

    #[test]
    fn test_insensitive_parse() {
        let raw = format!(
            "/subscriptions/{}/resourcegroups/rg1/providers/microsoft.network/virtualnetworks/vnet1/subnets/subnet1",
            SUB
        );
        assert!(SubnetId::parse(&raw).is_err());
        let id = SubnetId::parse_insensitively(&raw).unwrap();
        assert_eq!(id.virtual_network_name, "vnet1");
        assert_eq!(id.subnet_name, "subnet1");
    }

    #[test]
    fn test_display_names_the_resource() {
        let id = RedisId::new(SUB, "rg1", "cache1");
        assert_eq!(
            id.to_string(),
            format!(
                "Redis Cache (Subscription: \"{}\" / Resource Group Name: \"rg1\" / Redis Name: \"cache1\")",
                SUB
            )
        );
    }

    #[test]
    fn test_database_server_id() {
        let db = SqlDatabaseId::new(SUB, "rg1", "srv1", "db1");
        assert_eq!(db.server_id(), SqlServerId::new(SUB, "rg1", "srv1"));
    }
}
