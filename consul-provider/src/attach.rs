//! Read-modify-write of a parent object's link list, guarded by its
//! `ModifyIndex`.
//!
//! Each attempt fetches the parent, edits the links, re-fetches to make sure
//! nobody wrote in between, writes the full parent back, then verifies the
//! link landed. A moved index or a failed verification retries with
//! jittered backoff until the attempt budget runs out.

use crate::client::acl::{AclLink, AclRole, AclToken};
use crate::client::namespace::Namespace;
use crate::client::ConsulClient;
use crate::context::ConsulContext;
use crate::metrics::record_attachment_retry;
use crate::options::{ReadOptions, WriteOptions};
use async_trait::async_trait;
use provider_core::{ProviderError, Result};
use tokio::time::sleep;
use tracing::{debug, warn};

/// One kind of many-to-many link stored on a parent object.
#[async_trait]
pub trait LinkKind: Send + Sync + 'static {
    type Parent: Send + Sync;

    /// Resource type name, used in logs and metrics.
    fn resource(&self) -> &'static str;
    /// Attribute names of the parent key and the child key.
    fn fields(&self) -> (&'static str, &'static str);

    async fn fetch(&self, client: &ConsulClient, parent: &str, opts: &ReadOptions) -> Result<Option<Self::Parent>>;
    async fn store(&self, client: &ConsulClient, parent: &Self::Parent, opts: &WriteOptions) -> Result<()>;

    fn modify_index(&self, parent: &Self::Parent) -> u64;
    fn links<'p>(&self, parent: &'p Self::Parent) -> &'p [AclLink];
    fn links_mut<'p>(&self, parent: &'p mut Self::Parent) -> &'p mut Vec<AclLink>;
    /// The link value stored for `child`.
    fn link(&self, child: &str) -> AclLink;
    fn matches(&self, link: &AclLink, child: &str) -> bool;

    fn has_link(&self, parent: &Self::Parent, child: &str) -> bool {
        self.links(parent).iter().any(|l| self.matches(l, child))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkChange {
    Attach,
    Detach,
}

enum Attempt {
    Done,
    Raced(&'static str),
}

/// Apply `change` for `child` on `parent`, retrying lost races.
pub async fn apply<L: LinkKind>(
    kind: &L,
    ctx: &ConsulContext,
    parent: &str,
    child: &str,
    change: LinkChange,
    read: &ReadOptions,
    write: &WriteOptions,
) -> Result<()> {
    // Verification must not be answered by a lagging follower.
    let read = ReadOptions {
        allow_stale: false,
        require_consistent: true,
        ..read.clone()
    };
    let backoff = &ctx.attachment_retry;
    let mut attempt = 0;

    loop {
        match attempt_once(kind, &ctx.client, parent, child, change, attempt, &read, write).await? {
            Attempt::Done => return Ok(()),
            Attempt::Raced(reason) => {
                if !backoff.allows_another(attempt + 1) {
                    return Err(ProviderError::conflict(format!(
                        "{}: gave up on {}:{} after {} attempts ({})",
                        kind.resource(),
                        parent,
                        child,
                        attempt + 1,
                        reason
                    )));
                }
                record_attachment_retry(kind.resource());
                let wait = backoff.delay(attempt + 1);
                warn!(
                    resource = kind.resource(),
                    parent = %parent,
                    child = %child,
                    attempt = attempt + 1,
                    reason,
                    wait_ms = wait.as_millis() as u64,
                    "Concurrent modification of parent, retrying"
                );
                sleep(wait).await;
                attempt += 1;
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn attempt_once<L: LinkKind>(
    kind: &L,
    client: &ConsulClient,
    parent_id: &str,
    child: &str,
    change: LinkChange,
    attempt: u32,
    read: &ReadOptions,
    write: &WriteOptions,
) -> Result<Attempt> {
    let missing = || ProviderError::not_found(format!("{} {:?} not found", kind.fields().0, parent_id));

    let mut parent = kind.fetch(client, parent_id, read).await?.ok_or_else(missing)?;
    let index = kind.modify_index(&parent);

    match change {
        LinkChange::Attach => {
            if kind.has_link(&parent, child) {
                // a late write from an earlier attempt still counts
                if attempt > 0 {
                    return Ok(Attempt::Done);
                }
                return Err(ProviderError::conflict(format!(
                    "{} {:?} is already attached to {} {:?}",
                    kind.fields().1,
                    child,
                    kind.fields().0,
                    parent_id
                )));
            }
            kind.links_mut(&mut parent).push(kind.link(child));
        }
        LinkChange::Detach => {
            let links = kind.links_mut(&mut parent);
            match links.iter().position(|l| kind.matches(l, child)) {
                Some(pos) => {
                    links.remove(pos);
                }
                None => return Ok(Attempt::Done),
            }
        }
    }

    let current = kind.fetch(client, parent_id, read).await?.ok_or_else(missing)?;
    if kind.modify_index(&current) != index {
        return Ok(Attempt::Raced("parent changed before write"));
    }

    kind.store(client, &parent, write).await?;
    debug!(resource = kind.resource(), parent = %parent_id, child = %child, ?change, "Parent written");

    let after = kind.fetch(client, parent_id, read).await?.ok_or_else(missing)?;
    let present = kind.has_link(&after, child);
    Ok(match (change, present) {
        (LinkChange::Attach, true) | (LinkChange::Detach, false) => Attempt::Done,
        _ => Attempt::Raced("link verification failed"),
    })
}

pub struct RolePolicy;

#[async_trait]
impl LinkKind for RolePolicy {
    type Parent = AclRole;

    fn resource(&self) -> &'static str {
        "consul_acl_role_policy_attachment"
    }

    fn fields(&self) -> (&'static str, &'static str) {
        ("role_id", "policy")
    }

    async fn fetch(&self, client: &ConsulClient, parent: &str, opts: &ReadOptions) -> Result<Option<AclRole>> {
        client.acl_role_read(parent, opts).await
    }

    async fn store(&self, client: &ConsulClient, parent: &AclRole, opts: &WriteOptions) -> Result<()> {
        client.acl_role_update(parent, opts).await.map(|_| ())
    }

    fn modify_index(&self, parent: &AclRole) -> u64 {
        parent.modify_index
    }

    fn links<'p>(&self, parent: &'p AclRole) -> &'p [AclLink] {
        &parent.policies
    }

    fn links_mut<'p>(&self, parent: &'p mut AclRole) -> &'p mut Vec<AclLink> {
        &mut parent.policies
    }

    fn link(&self, child: &str) -> AclLink {
        AclLink::by_id(child)
    }

    fn matches(&self, link: &AclLink, child: &str) -> bool {
        link.id == child
    }
}

/// Links on a token, referenced by name.
pub struct TokenLink {
    resource: &'static str,
    child_field: &'static str,
    roles: bool,
}

pub const TOKEN_POLICY: TokenLink = TokenLink {
    resource: "consul_acl_token_policy_attachment",
    child_field: "policy",
    roles: false,
};

pub const TOKEN_ROLE: TokenLink = TokenLink {
    resource: "consul_acl_token_role_attachment",
    child_field: "role",
    roles: true,
};

#[async_trait]
impl LinkKind for TokenLink {
    type Parent = AclToken;

    fn resource(&self) -> &'static str {
        self.resource
    }

    fn fields(&self) -> (&'static str, &'static str) {
        ("token_id", self.child_field)
    }

    async fn fetch(&self, client: &ConsulClient, parent: &str, opts: &ReadOptions) -> Result<Option<AclToken>> {
        client.acl_token_read(parent, opts).await
    }

    async fn store(&self, client: &ConsulClient, parent: &AclToken, opts: &WriteOptions) -> Result<()> {
        client.acl_token_update(parent, opts).await.map(|_| ())
    }

    fn modify_index(&self, parent: &AclToken) -> u64 {
        parent.modify_index
    }

    fn links<'p>(&self, parent: &'p AclToken) -> &'p [AclLink] {
        if self.roles {
            &parent.roles
        } else {
            &parent.policies
        }
    }

    fn links_mut<'p>(&self, parent: &'p mut AclToken) -> &'p mut Vec<AclLink> {
        if self.roles {
            &mut parent.roles
        } else {
            &mut parent.policies
        }
    }

    fn link(&self, child: &str) -> AclLink {
        AclLink::by_name(child)
    }

    fn matches(&self, link: &AclLink, child: &str) -> bool {
        link.name == child
    }
}

/// Default policies or roles of a namespace, referenced by name.
pub struct NamespaceLink {
    resource: &'static str,
    child_field: &'static str,
    roles: bool,
}

pub const NAMESPACE_POLICY: NamespaceLink = NamespaceLink {
    resource: "consul_namespace_policy_attachment",
    child_field: "policy",
    roles: false,
};

pub const NAMESPACE_ROLE: NamespaceLink = NamespaceLink {
    resource: "consul_namespace_role_attachment",
    child_field: "role",
    roles: true,
};

#[async_trait]
impl LinkKind for NamespaceLink {
    type Parent = Namespace;

    fn resource(&self) -> &'static str {
        self.resource
    }

    fn fields(&self) -> (&'static str, &'static str) {
        ("namespace", self.child_field)
    }

    async fn fetch(&self, client: &ConsulClient, parent: &str, opts: &ReadOptions) -> Result<Option<Namespace>> {
        client.namespace_read(parent, opts).await
    }

    async fn store(&self, client: &ConsulClient, parent: &Namespace, opts: &WriteOptions) -> Result<()> {
        client.namespace_update(parent, opts).await.map(|_| ())
    }

    fn modify_index(&self, parent: &Namespace) -> u64 {
        parent.modify_index
    }

    fn links<'p>(&self, parent: &'p Namespace) -> &'p [AclLink] {
        if self.roles {
            &parent.acls.role_defaults
        } else {
            &parent.acls.policy_defaults
        }
    }

    fn links_mut<'p>(&self, parent: &'p mut Namespace) -> &'p mut Vec<AclLink> {
        if self.roles {
            &mut parent.acls.role_defaults
        } else {
            &mut parent.acls.policy_defaults
        }
    }

    fn link(&self, child: &str) -> AclLink {
        AclLink::by_name(child)
    }

    fn matches(&self, link: &AclLink, child: &str) -> bool {
        link.name == child
    }
}
