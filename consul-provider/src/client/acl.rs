//! ACL endpoints: policies, roles, tokens, auth methods, binding rules, bootstrap.

use super::{escape, ConsulClient, WireSecret};
use crate::options::{ReadOptions, WriteOptions};
use provider_core::{ProviderError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A reference to a policy or role, by id or by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclLink {
    #[serde(rename = "ID", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "Name", default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

impl AclLink {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
        }
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceIdentity {
    pub service_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub datacenters: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeIdentity {
    pub node_name: String,
    pub datacenter: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AclPolicy {
    #[serde(rename = "ID", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub rules: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub datacenters: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,
    #[serde(default, skip_serializing)]
    pub modify_index: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AclRole {
    #[serde(rename = "ID", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub policies: Vec<AclLink>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub service_identities: Vec<ServiceIdentity>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub node_identities: Vec<NodeIdentity>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,
    #[serde(default, skip_serializing)]
    pub modify_index: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AclToken {
    #[serde(rename = "AccessorID", default, skip_serializing_if = "String::is_empty")]
    pub accessor_id: String,
    #[serde(rename = "SecretID", default, skip_serializing_if = "Option::is_none")]
    pub secret_id: Option<WireSecret>,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub policies: Vec<AclLink>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub roles: Vec<AclLink>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub service_identities: Vec<ServiceIdentity>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub node_identities: Vec<NodeIdentity>,
    #[serde(default)]
    pub local: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_time: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,
    #[serde(default, skip_serializing)]
    pub modify_index: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NamespaceRule {
    pub selector: String,
    pub bind_namespace: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AclAuthMethod {
    pub name: String,
    #[serde(rename = "Type")]
    pub method_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "MaxTokenTTL", default, skip_serializing_if = "String::is_empty")]
    pub max_token_ttl: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token_locality: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub config: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub namespace_rules: Vec<NamespaceRule>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AclBindingRule {
    #[serde(rename = "ID", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub auth_method: String,
    #[serde(default)]
    pub selector: String,
    pub bind_type: String,
    pub bind_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,
}

/// Consul sends `null` for empty collections.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl ConsulClient {
    pub async fn acl_policy_create(&self, policy: &AclPolicy, opts: &WriteOptions) -> Result<AclPolicy> {
        self.put("/v1/acl/policy", opts, policy).await
    }

    pub async fn acl_policy_read(&self, id: &str, opts: &ReadOptions) -> Result<Option<AclPolicy>> {
        let path = format!("/v1/acl/policy/{}", escape(id));
        Ok(self.get_optional(&path, opts, &[]).await?.map(|(p, _)| p))
    }

    pub async fn acl_policy_read_by_name(
        &self,
        name: &str,
        opts: &ReadOptions,
    ) -> Result<Option<AclPolicy>> {
        let path = format!("/v1/acl/policy/name/{}", escape(name));
        Ok(self.get_optional(&path, opts, &[]).await?.map(|(p, _)| p))
    }

    pub async fn acl_policy_update(&self, policy: &AclPolicy, opts: &WriteOptions) -> Result<AclPolicy> {
        let path = format!("/v1/acl/policy/{}", escape(&policy.id));
        self.put(&path, opts, policy).await
    }

    pub async fn acl_policy_delete(&self, id: &str, opts: &WriteOptions) -> Result<()> {
        self.delete(&format!("/v1/acl/policy/{}", escape(id)), opts, &[])
            .await
    }

    pub async fn acl_role_create(&self, role: &AclRole, opts: &WriteOptions) -> Result<AclRole> {
        self.put("/v1/acl/role", opts, role).await
    }

    pub async fn acl_role_read(&self, id: &str, opts: &ReadOptions) -> Result<Option<AclRole>> {
        let path = format!("/v1/acl/role/{}", escape(id));
        Ok(self.get_optional(&path, opts, &[]).await?.map(|(r, _)| r))
    }

    pub async fn acl_role_read_by_name(&self, name: &str, opts: &ReadOptions) -> Result<Option<AclRole>> {
        let path = format!("/v1/acl/role/name/{}", escape(name));
        Ok(self.get_optional(&path, opts, &[]).await?.map(|(r, _)| r))
    }

    pub async fn acl_role_update(&self, role: &AclRole, opts: &WriteOptions) -> Result<AclRole> {
        let path = format!("/v1/acl/role/{}", escape(&role.id));
        self.put(&path, opts, role).await
    }

    pub async fn acl_role_delete(&self, id: &str, opts: &WriteOptions) -> Result<()> {
        self.delete(&format!("/v1/acl/role/{}", escape(id)), opts, &[])
            .await
    }

    pub async fn acl_token_create(&self, token: &AclToken, opts: &WriteOptions) -> Result<AclToken> {
        self.put("/v1/acl/token", opts, token).await
    }

    pub async fn acl_token_read(&self, accessor_id: &str, opts: &ReadOptions) -> Result<Option<AclToken>> {
        let path = format!("/v1/acl/token/{}", escape(accessor_id));
        Ok(self.get_optional(&path, opts, &[]).await?.map(|(t, _)| t))
    }

    pub async fn acl_token_update(&self, token: &AclToken, opts: &WriteOptions) -> Result<AclToken> {
        let path = format!("/v1/acl/token/{}", escape(&token.accessor_id));
        self.put(&path, opts, token).await
    }

    pub async fn acl_token_delete(&self, accessor_id: &str, opts: &WriteOptions) -> Result<()> {
        self.delete(&format!("/v1/acl/token/{}", escape(accessor_id)), opts, &[])
            .await
    }

    pub async fn acl_auth_method_create(
        &self,
        method: &AclAuthMethod,
        opts: &WriteOptions,
    ) -> Result<AclAuthMethod> {
        self.put("/v1/acl/auth-method", opts, method).await
    }

    pub async fn acl_auth_method_read(
        &self,
        name: &str,
        opts: &ReadOptions,
    ) -> Result<Option<AclAuthMethod>> {
        let path = format!("/v1/acl/auth-method/{}", escape(name));
        Ok(self.get_optional(&path, opts, &[]).await?.map(|(m, _)| m))
    }

    pub async fn acl_auth_method_update(
        &self,
        method: &AclAuthMethod,
        opts: &WriteOptions,
    ) -> Result<AclAuthMethod> {
        let path = format!("/v1/acl/auth-method/{}", escape(&method.name));
        self.put(&path, opts, method).await
    }

    pub async fn acl_auth_method_delete(&self, name: &str, opts: &WriteOptions) -> Result<()> {
        self.delete(&format!("/v1/acl/auth-method/{}", escape(name)), opts, &[])
            .await
    }

    pub async fn acl_binding_rule_create(
        &self,
        rule: &AclBindingRule,
        opts: &WriteOptions,
    ) -> Result<AclBindingRule> {
        self.put("/v1/acl/binding-rule", opts, rule).await
    }

    pub async fn acl_binding_rule_read(
        &self,
        id: &str,
        opts: &ReadOptions,
    ) -> Result<Option<AclBindingRule>> {
        let path = format!("/v1/acl/binding-rule/{}", escape(id));
        Ok(self.get_optional(&path, opts, &[]).await?.map(|(r, _)| r))
    }

    pub async fn acl_binding_rule_update(
        &self,
        rule: &AclBindingRule,
        opts: &WriteOptions,
    ) -> Result<AclBindingRule> {
        let path = format!("/v1/acl/binding-rule/{}", escape(&rule.id));
        self.put(&path, opts, rule).await
    }

    pub async fn acl_binding_rule_delete(&self, id: &str, opts: &WriteOptions) -> Result<()> {
        self.delete(&format!("/v1/acl/binding-rule/{}", escape(id)), opts, &[])
            .await
    }

    /// One-shot bootstrap. A cluster that was already bootstrapped is a conflict.
    pub async fn acl_bootstrap(&self, opts: &WriteOptions) -> Result<AclToken> {
        match self.put::<_, AclToken>("/v1/acl/bootstrap", opts, &Value::Null).await {
            Ok(token) => Ok(token),
            Err(e) if e.to_string().contains("no longer allowed") => Err(ProviderError::conflict(
                "ACL system is already bootstrapped",
            )),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_null_collections() {
        let token: AclToken = serde_json::from_value(json!({
            "AccessorID": "a", "SecretID": "s", "Policies": null, "Roles": null, "Local": true
        }))
        .unwrap();
        assert!(token.policies.is_empty());
        assert_eq!(token.secret_id.as_ref().map(|s| s.expose()), Some("s"));
        assert!(!format!("{:?}", token).contains("\"s\""));
    }

    #[test]
    fn test_links_serialize_only_set_fields() {
        let link = serde_json::to_value(AclLink::by_name("p1")).unwrap();
        assert_eq!(link, json!({"Name": "p1"}));
    }
}
