//! Azure cloud environments
//!
//! Endpoints differ between the public cloud and the sovereign clouds.

use anyhow::Result;

/// Endpoints for a single Azure cloud
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudEnvironment {
    pub name: String,
    /// Base URL of the Resource Manager API, without trailing slash
    pub resource_manager_endpoint: String,
    /// Audience requested when acquiring tokens
    pub resource_manager_audience: String,
    /// Azure AD authority host, without trailing slash
    pub authority_host: String,
}

impl CloudEnvironment {
    pub fn public() -> Self {
        Self {
            name: "public".to_string(),
            resource_manager_endpoint: "https://management.azure.com".to_string(),
            resource_manager_audience: "https://management.core.windows.net/".to_string(),
            authority_host: "https://login.microsoftonline.com".to_string(),
        }
    }

    pub fn china() -> Self {
        Self {
            name: "china".to_string(),
            resource_manager_endpoint: "https://management.chinacloudapi.cn".to_string(),
            resource_manager_audience: "https://management.core.chinacloudapi.cn/".to_string(),
            authority_host: "https://login.chinacloudapi.cn".to_string(),
        }
    }

    pub fn us_government() -> Self {
        Self {
            name: "usgovernment".to_string(),
            resource_manager_endpoint: "https://management.usgovcloudapi.net".to_string(),
            resource_manager_audience: "https://management.core.usgovcloudapi.net/".to_string(),
            authority_host: "https://login.microsoftonline.us".to_string(),
        }
    }

    /// Environment with explicit endpoints (Azure Stack, local mock servers)
    pub fn custom(resource_manager_endpoint: &str, authority_host: &str) -> Self {
        Self {
            name: "custom".to_string(),
            resource_manager_endpoint: resource_manager_endpoint.trim_end_matches('/').to_string(),
            resource_manager_audience: format!(
                "{}/",
                resource_manager_endpoint.trim_end_matches('/')
            ),
            authority_host: authority_host.trim_end_matches('/').to_string(),
        }
    }

    /// Look up a well-known environment by the names accepted in `ARM_ENVIRONMENT`
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "" | "public" | "azurecloud" => Ok(Self::public()),
            "china" | "azurechinacloud" => Ok(Self::china()),
            "usgovernment" | "azureusgovernmentcloud" => Ok(Self::us_government()),
            other => Err(anyhow::anyhow!(
                "Unknown Azure environment {:?}: expected one of public, china, usgovernment",
                other
            )),
        }
    }

    /// OAuth2 scope for the Resource Manager audience
    pub fn token_scope(&self) -> String {
        format!("{}.default", self.resource_manager_audience)
    }
}

impl Default for CloudEnvironment {
    fn default() -> Self {
        Self::public()
    }
}
