//! Many-to-many links stored on a parent object, one handler per link kind.
//!
//! Link objects carry no scope attributes of their own, so every call uses
//! the provider-wide options.

use crate::attach::{apply, LinkChange, LinkKind};
use crate::context::ConsulContext;
use async_trait::async_trait;
use provider_core::ids::{decode_pair, encode_pair};
use provider_core::{AttrRead, Attribute, Resource, ResourceData, Result, Schema};

pub struct AttachmentResource<L> {
    kind: L,
}

impl<L: LinkKind> AttachmentResource<L> {
    pub fn new(kind: L) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl<L: LinkKind> Resource<ConsulContext> for AttachmentResource<L> {
    fn schema(&self) -> Schema {
        let (parent, child) = self.kind.fields();
        Schema::new(0)
            .attribute(parent, Attribute::string().required().force_new())
            .attribute(child, Attribute::string().required().force_new())
    }

    async fn create(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (parent_field, child_field) = self.kind.fields();
        let parent = d.string(parent_field);
        let child = d.string(child_field);
        let (read, write) = ctx.default_options();

        apply(&self.kind, ctx, &parent, &child, LinkChange::Attach, &read, &write).await?;
        d.set_id(encode_pair(&parent, &child));
        self.read(ctx, d).await
    }

    async fn read(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (parent_field, child_field) = self.kind.fields();
        let (parent_id, child) = decode_pair(d.id())?;
        let (read, _) = ctx.default_options();

        let linked = match self.kind.fetch(&ctx.client, &parent_id, &read).await? {
            Some(parent) => self.kind.has_link(&parent, &child),
            None => false,
        };
        if !linked {
            d.clear_id();
            return Ok(());
        }

        let mut w = d.writer();
        w.set(parent_field, &parent_id).set(child_field, &child);
        w.finish()
    }

    async fn delete(&self, ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        let (parent_id, child) = decode_pair(d.id())?;
        let (read, write) = ctx.default_options();

        apply(&self.kind, ctx, &parent_id, &child, LinkChange::Detach, &read, &write).await?;
        d.clear_id();
        Ok(())
    }

    fn importable(&self) -> bool {
        true
    }

    async fn import(&self, _ctx: &ConsulContext, d: &mut ResourceData) -> Result<()> {
        decode_pair(d.id()).map(|_| ())
    }
}
