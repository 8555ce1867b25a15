//! In-memory Consul served over real HTTP through wiremock.
#![allow(dead_code)]

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use consul_provider::{ConsulClient, ConsulContext, ProviderDefaults};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, Once};
use wiremock::matchers::any;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const DATACENTER: &str = "dc1";

static TRACING: Once = Once::new();

/// Route test logs through the test harness writer, once per process.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
            )
            .with_test_writer()
            .try_init();
    });
}

pub fn config(v: Value) -> Map<String, Value> {
    v.as_object().cloned().expect("config must be a JSON object")
}

#[derive(Debug, Clone)]
pub struct KvEntry {
    pub value: Vec<u8>,
    pub flags: u64,
    pub create_index: u64,
    pub modify_index: u64,
}

/// A concurrent writer simulated on a token: after `after_reads` more reads
/// of the token, `policy` is linked to it out of band.
#[derive(Debug, Clone)]
struct Interference {
    accessor_id: String,
    policy: String,
    after_reads: u32,
}

#[derive(Debug, Default)]
pub struct Store {
    index: u64,
    pub policies: BTreeMap<String, Value>,
    pub tokens: BTreeMap<String, Value>,
    pub kv: BTreeMap<String, KvEntry>,
    pub config_entries: BTreeMap<(String, String), Value>,
    pub queries: BTreeMap<String, Value>,
    pub nodes: BTreeMap<String, Value>,
    pub services: BTreeMap<(String, String), Value>,
    pub peering_tokens_issued: u32,
    /// ACL roles, auth methods, binding rules, namespaces, partitions,
    /// intentions, network areas and peerings, keyed by kind and id.
    pub objects: BTreeMap<(&'static str, String), Value>,
    pub agent_tokens: BTreeMap<String, String>,
    pub ca: Value,
    pub autopilot: Value,
    /// The raw text of the installed license.
    pub license: Option<String>,
    bootstrapped: bool,
    /// `"<METHOD> <path>"` of every request, in arrival order.
    pub requests: Vec<String>,
    interference: Option<Interference>,
}

impl Store {
    fn next_index(&mut self) -> u64 {
        self.index += 1;
        self.index
    }

    pub fn put_key(&mut self, key: &str, value: &str) {
        let index = self.next_index();
        self.kv.insert(
            key.to_string(),
            KvEntry {
                value: value.as_bytes().to_vec(),
                flags: 0,
                create_index: index,
                modify_index: index,
            },
        );
    }

    pub fn key_values(&self, prefix: &str) -> BTreeMap<String, String> {
        self.kv
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, e)| (k.clone(), String::from_utf8_lossy(&e.value).into_owned()))
            .collect()
    }

    pub fn insert_token(&mut self, accessor_id: &str, secret_id: &str) {
        let index = self.next_index();
        self.tokens.insert(
            accessor_id.to_string(),
            json!({
                "AccessorID": accessor_id,
                "SecretID": secret_id,
                "Description": "",
                "Policies": [],
                "Roles": [],
                "Local": false,
                "CreateIndex": index,
                "ModifyIndex": index,
            }),
        );
    }

    pub fn token_policy_names(&self, accessor_id: &str) -> Vec<String> {
        self.tokens
            .get(accessor_id)
            .and_then(|t| t["Policies"].as_array())
            .map(|links| {
                links
                    .iter()
                    .filter_map(|l| l["Name"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn policy_by_name(&self, name: &str) -> Option<&Value> {
        self.policies.values().find(|p| p["Name"] == name)
    }

    /// Fill in whichever half of each `{ID, Name}` link is missing.
    fn resolve_policy_links(&self, doc: &mut Value) {
        let Some(links) = doc.get_mut("Policies").and_then(Value::as_array_mut) else {
            return;
        };
        for link in links {
            if link["ID"].as_str().unwrap_or("").is_empty() {
                if let Some(p) = link["Name"].as_str().and_then(|n| self.policy_by_name(n)) {
                    link["ID"] = p["ID"].clone();
                }
            }
            if link["Name"].as_str().unwrap_or("").is_empty() {
                if let Some(p) = link["ID"].as_str().and_then(|id| self.policies.get(id)) {
                    link["Name"] = p["Name"].clone();
                }
            }
        }
    }

    fn route(&mut self, method: &str, path: &str, query: &BTreeMap<String, String>, body: &[u8]) -> ResponseTemplate {
        let segments: Vec<&str> = path.trim_start_matches("/v1/").split('/').collect();
        match (method, segments.as_slice()) {
            ("GET", ["agent", "self"]) => ok(json!({"Config": {"Datacenter": DATACENTER}})),
            ("GET", ["catalog", "datacenters"]) => ok(json!(["dc2", DATACENTER])),

            ("PUT", ["acl", "policy"]) => {
                let mut doc = parse(body);
                let id = uuid::Uuid::new_v4().to_string();
                doc["ID"] = json!(id);
                self.stamp(&mut doc, true);
                self.policies.insert(id, doc.clone());
                ok(doc)
            }
            ("GET", ["acl", "policy", "name", name]) => match self.policy_by_name(name) {
                Some(p) => ok(p.clone()),
                None => acl_not_found(),
            },
            ("GET", ["acl", "policy", id]) => match self.policies.get(*id) {
                Some(p) => ok(p.clone()),
                None => acl_not_found(),
            },
            ("PUT", ["acl", "policy", id]) => {
                if !self.policies.contains_key(*id) {
                    return acl_not_found();
                }
                let mut doc = parse(body);
                doc["ID"] = json!(id);
                self.stamp(&mut doc, false);
                self.policies.insert(id.to_string(), doc.clone());
                ok(doc)
            }
            ("DELETE", ["acl", "policy", id]) => {
                self.policies.remove(*id);
                ok(json!(true))
            }

            ("PUT", ["acl", "token"]) => {
                let mut doc = parse(body);
                let accessor = doc["AccessorID"]
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                if doc["SecretID"].as_str().unwrap_or("").is_empty() {
                    doc["SecretID"] = json!(uuid::Uuid::new_v4().to_string());
                }
                doc["AccessorID"] = json!(accessor);
                self.resolve_policy_links(&mut doc);
                self.stamp(&mut doc, true);
                self.tokens.insert(accessor, doc.clone());
                ok(doc)
            }
            ("GET", ["acl", "token", id]) => {
                self.interfere(id);
                match self.tokens.get(*id) {
                    Some(t) => ok(t.clone()),
                    None => acl_not_found(),
                }
            }
            ("PUT", ["acl", "token", id]) => {
                let Some(existing) = self.tokens.get(*id).cloned() else {
                    return acl_not_found();
                };
                let mut doc = parse(body);
                doc["AccessorID"] = json!(id);
                doc["SecretID"] = existing["SecretID"].clone();
                doc["CreateIndex"] = existing["CreateIndex"].clone();
                self.resolve_policy_links(&mut doc);
                self.stamp(&mut doc, false);
                self.tokens.insert(id.to_string(), doc.clone());
                ok(doc)
            }
            ("DELETE", ["acl", "token", id]) => {
                self.tokens.remove(*id);
                ok(json!(true))
            }

            ("GET", ["kv", ..]) | ("PUT", ["kv", ..]) | ("DELETE", ["kv", ..]) => {
                let key = path.trim_start_matches("/v1/kv/");
                self.kv_route(method, key, query, body)
            }

            ("PUT", ["config"]) => {
                let mut doc = parse(body);
                let key = (
                    doc["Kind"].as_str().unwrap_or_default().to_string(),
                    doc["Name"].as_str().unwrap_or_default().to_string(),
                );
                if key.0 == "service-defaults" {
                    for block in ["TransparentProxy", "MeshGateway", "Expose"] {
                        if doc.get(block).is_none() {
                            doc[block] = json!({});
                        }
                    }
                }
                let index = self.next_index();
                let created = self
                    .config_entries
                    .get(&key)
                    .map(|e| e["CreateIndex"].clone())
                    .unwrap_or(json!(index));
                doc["CreateIndex"] = created;
                doc["ModifyIndex"] = json!(index);
                self.config_entries.insert(key, doc);
                ok(json!(true))
            }
            ("GET", ["config", kind, name]) => {
                match self.config_entries.get(&(kind.to_string(), name.to_string())) {
                    Some(doc) => ok(doc.clone()),
                    None => not_found(&format!("Config entry not found for {:?} / {:?}", kind, name)),
                }
            }
            ("DELETE", ["config", kind, name]) => {
                self.config_entries.remove(&(kind.to_string(), name.to_string()));
                ok(json!(true))
            }

            ("POST", ["query"]) => {
                let mut doc = parse(body);
                let id = uuid::Uuid::new_v4().to_string();
                doc["ID"] = json!(id);
                self.queries.insert(id.clone(), doc);
                ok(json!({"ID": id}))
            }
            ("GET", ["query", id]) => match self.queries.get(*id) {
                Some(q) => ok(json!([q])),
                None => not_found("Query not found"),
            },
            ("PUT", ["query", id]) => {
                let mut doc = parse(body);
                doc["ID"] = json!(id);
                self.queries.insert(id.to_string(), doc);
                ok(Value::Null)
            }
            ("DELETE", ["query", id]) => {
                self.queries.remove(*id);
                ok(Value::Null)
            }

            ("POST", ["peering", "token"]) => {
                self.peering_tokens_issued += 1;
                let token = STANDARD.encode(format!("peering-secret-{}", self.peering_tokens_issued));
                ok(json!({"PeeringToken": token}))
            }

            ("PUT", ["catalog", "register"]) => {
                let doc = parse(body);
                let node = doc["Node"].as_str().unwrap_or_default().to_string();
                let skip = doc["SkipNodeUpdate"].as_bool().unwrap_or(false);
                if !skip || !self.nodes.contains_key(&node) {
                    self.nodes.insert(
                        node.clone(),
                        json!({
                            "ID": uuid::Uuid::new_v4().to_string(),
                            "Node": node,
                            "Address": doc["Address"],
                            "Datacenter": DATACENTER,
                            "Meta": doc.get("NodeMeta").cloned().unwrap_or(json!({})),
                            "TaggedAddresses": {},
                        }),
                    );
                }
                if let Some(service) = doc.get("Service").filter(|s| !s.is_null()) {
                    let id = service["ID"].as_str().unwrap_or_default().to_string();
                    self.services.insert((node, id), service.clone());
                }
                ok(json!(true))
            }
            ("PUT", ["catalog", "deregister"]) => {
                let doc = parse(body);
                let node = doc["Node"].as_str().unwrap_or_default().to_string();
                match doc["ServiceID"].as_str() {
                    Some(id) => {
                        self.services.remove(&(node, id.to_string()));
                    }
                    None => {
                        self.nodes.remove(&node);
                        self.services.retain(|(n, _), _| *n != node);
                    }
                }
                ok(json!(true))
            }
            ("GET", ["catalog", "nodes"]) => ok(Value::Array(self.nodes.values().cloned().collect())),
            ("GET", ["catalog", "node", name]) => match self.nodes.get(*name) {
                Some(node) => {
                    let services: Map<String, Value> = self
                        .services
                        .iter()
                        .filter(|((n, _), _)| n == name)
                        .map(|((_, id), s)| (id.clone(), s.clone()))
                        .collect();
                    ok(json!({"Node": node, "Services": services}))
                }
                None => ok(Value::Null),
            },
            ("GET", ["catalog", "services"]) => {
                let mut out: BTreeMap<String, Vec<Value>> = BTreeMap::new();
                for service in self.services.values() {
                    let name = service["Service"].as_str().unwrap_or_default().to_string();
                    let tags = out.entry(name).or_default();
                    for tag in service["Tags"].as_array().into_iter().flatten() {
                        if !tags.contains(tag) {
                            tags.push(tag.clone());
                        }
                    }
                }
                ok(json!(out))
            }
            ("GET", ["catalog", "service", name]) => {
                let instances: Vec<Value> = self
                    .services
                    .iter()
                    .filter(|(_, s)| s["Service"] == *name)
                    .filter(|(_, s)| match query.get("tag") {
                        Some(tag) => s["Tags"].as_array().map_or(false, |t| t.contains(&json!(tag))),
                        None => true,
                    })
                    .map(|((node, _), s)| {
                        let n = &self.nodes[node];
                        json!({
                            "ID": n["ID"],
                            "Node": node,
                            "Address": n["Address"],
                            "Datacenter": DATACENTER,
                            "NodeMeta": n["Meta"],
                            "ServiceID": s["ID"],
                            "ServiceName": s["Service"],
                            "ServiceAddress": s["Address"],
                            "ServiceTags": s["Tags"],
                            "ServiceMeta": s["Meta"],
                            "ServicePort": s["Port"],
                        })
                    })
                    .collect();
                ok(Value::Array(instances))
            }
            ("GET", ["health", "node", _]) => ok(json!([])),

            ("PUT", ["acl", "bootstrap"]) => {
                if self.bootstrapped {
                    return ResponseTemplate::new(403)
                        .set_body_string("Permission denied: ACL bootstrap no longer allowed (reset index: 1)");
                }
                self.bootstrapped = true;
                let accessor = uuid::Uuid::new_v4().to_string();
                let mut doc = json!({
                    "AccessorID": accessor,
                    "SecretID": uuid::Uuid::new_v4().to_string(),
                    "Description": "Bootstrap Token (Global Management)",
                    "Policies": [{"ID": "00000000-0000-0000-0000-000000000001", "Name": "global-management"}],
                    "Local": false,
                });
                self.stamp(&mut doc, true);
                self.tokens.insert(accessor, doc.clone());
                ok(doc)
            }

            ("PUT", ["acl", "role"]) => {
                let mut doc = parse(body);
                self.resolve_policy_links(&mut doc);
                self.create_object("role", "ID", doc)
            }
            ("GET", ["acl", "role", "name", name]) => {
                match self.objects_of("role").into_iter().find(|r| r["Name"] == *name) {
                    Some(r) => ok(r.clone()),
                    None => acl_not_found(),
                }
            }
            ("GET", ["acl", "role", id]) => self.read_object("role", id).unwrap_or_else(acl_not_found),
            ("PUT", ["acl", "role", id]) => {
                let mut doc = parse(body);
                self.resolve_policy_links(&mut doc);
                self.replace_object("role", "ID", id, doc).unwrap_or_else(acl_not_found)
            }
            ("DELETE", ["acl", "role", id]) => self.remove_object("role", id),

            ("PUT", ["acl", "auth-method"]) => self.create_object("auth-method", "Name", parse(body)),
            ("GET", ["acl", "auth-method", name]) => {
                self.read_object("auth-method", name).unwrap_or_else(acl_not_found)
            }
            ("PUT", ["acl", "auth-method", name]) => self
                .replace_object("auth-method", "Name", name, parse(body))
                .unwrap_or_else(acl_not_found),
            ("DELETE", ["acl", "auth-method", name]) => self.remove_object("auth-method", name),

            ("PUT", ["acl", "binding-rule"]) => self.create_object("binding-rule", "ID", parse(body)),
            ("GET", ["acl", "binding-rule", id]) => {
                self.read_object("binding-rule", id).unwrap_or_else(acl_not_found)
            }
            ("PUT", ["acl", "binding-rule", id]) => self
                .replace_object("binding-rule", "ID", id, parse(body))
                .unwrap_or_else(acl_not_found),
            ("DELETE", ["acl", "binding-rule", id]) => self.remove_object("binding-rule", id),

            ("PUT", ["agent", "token", slot]) => {
                let doc = parse(body);
                let token = doc["Token"].as_str().unwrap_or_default().to_string();
                self.agent_tokens.insert(slot.to_string(), token);
                ok(Value::Null)
            }

            ("PUT", ["namespace"]) => self.create_object("namespace", "Name", parse(body)),
            ("PUT", ["partition"]) => self.create_object("partition", "Name", parse(body)),
            ("GET", ["namespace", name]) => self.read_object("namespace", name).unwrap_or_else(|| not_found("")),
            ("PUT", ["namespace", name]) => self
                .replace_object("namespace", "Name", name, parse(body))
                .unwrap_or_else(|| not_found("")),
            // deletion is asynchronous on real servers: the object lingers, marked
            ("DELETE", ["namespace", name]) => self.mark_deleted("namespace", name),
            ("GET", ["partition", name]) => self.read_object("partition", name).unwrap_or_else(|| not_found("")),
            ("PUT", ["partition", name]) => self
                .replace_object("partition", "Name", name, parse(body))
                .unwrap_or_else(|| not_found("")),
            ("DELETE", ["partition", name]) => self.mark_deleted("partition", name),

            ("POST", ["connect", "intentions"]) => {
                let doc = parse(body);
                let id = uuid::Uuid::new_v4().to_string();
                self.insert_object("intention", &id, doc, "ID");
                ok(json!({"ID": id}))
            }
            ("GET", ["connect", "intentions", id]) => self
                .read_object("intention", id)
                .unwrap_or_else(|| not_found("Intention not found")),
            ("PUT", ["connect", "intentions", id]) => self
                .replace_object("intention", "ID", id, parse(body))
                .map(|_| ok(Value::Null))
                .unwrap_or_else(|| not_found("Intention not found")),
            ("DELETE", ["connect", "intentions", id]) => self.remove_object("intention", id),

            ("GET", ["connect", "ca", "configuration"]) => ok(self.ca_configuration()),
            ("PUT", ["connect", "ca", "configuration"]) => {
                let doc = parse(body);
                let mut config = self.ca_configuration()["Config"].clone();
                if let (Some(merged), Some(given)) = (config.as_object_mut(), doc["Config"].as_object()) {
                    merged.extend(given.clone());
                }
                self.ca = json!({"Provider": doc["Provider"], "Config": config});
                ok(Value::Null)
            }

            ("GET", ["operator", "autopilot", "configuration"]) => ok(self.autopilot_configuration()),
            ("PUT", ["operator", "autopilot", "configuration"]) => {
                let mut doc = parse(body);
                for key in ["LastContactThreshold", "ServerStabilizationTime"] {
                    let spelled = doc[key].as_str().map(go_duration);
                    if let Some(spelled) = spelled {
                        doc[key] = json!(spelled);
                    }
                }
                self.autopilot = doc;
                ok(json!(true))
            }

            ("POST", ["operator", "area"]) => {
                let doc = parse(body);
                let id = uuid::Uuid::new_v4().to_string();
                self.insert_object("area", &id, doc, "ID");
                ok(json!({"ID": id}))
            }
            ("GET", ["operator", "area", id]) => match self.objects.get(&("area", id.to_string())) {
                Some(area) => ok(json!([area])),
                None => ok(json!([])),
            },
            ("PUT", ["operator", "area", id]) => self
                .replace_object("area", "ID", id, parse(body))
                .map(|_| ok(Value::Null))
                .unwrap_or_else(|| not_found("area not found")),
            ("DELETE", ["operator", "area", id]) => self.remove_object("area", id),

            ("GET", ["operator", "license"]) => ok(self.license_reply()),
            ("PUT", ["operator", "license"]) => {
                let text = String::from_utf8_lossy(body).into_owned();
                if !text.starts_with("valid-") {
                    return ok(json!({"Valid": false, "Warnings": ["license could not be verified"]}));
                }
                self.license = Some(text);
                ok(self.license_reply())
            }
            ("DELETE", ["operator", "license"]) => {
                self.license = None;
                ok(self.license_reply())
            }

            ("POST", ["peering", "establish"]) => {
                let doc = parse(body);
                let name = doc["PeerName"].as_str().unwrap_or_default().to_string();
                if doc["PeeringToken"].as_str().unwrap_or("").is_empty() {
                    return ResponseTemplate::new(400).set_body_string("missing peering token");
                }
                let peering = json!({
                    "ID": uuid::Uuid::new_v4().to_string(),
                    "Name": name,
                    "State": "ACTIVE",
                    "PeerID": uuid::Uuid::new_v4().to_string(),
                    "PeerServerName": "server.dc2.peering.consul",
                    "PeerServerAddresses": ["10.0.2.10:8503"],
                    "PeerCAPems": null,
                    "Meta": doc.get("Meta").cloned().unwrap_or(Value::Null),
                    "StreamStatus": {"ImportedServices": ["billing"], "ExportedServices": null},
                });
                self.objects.insert(("peering", name), peering);
                ok(json!({}))
            }
            ("GET", ["peering", name]) => self
                .read_object("peering", name)
                .unwrap_or_else(|| not_found("peering not found")),
            ("DELETE", ["peering", name]) => self.mark_deleted("peering", name),

            _ => ResponseTemplate::new(404).set_body_string(format!("no route for {} {}", method, path)),
        }
    }

    fn kv_route(&mut self, method: &str, key: &str, query: &BTreeMap<String, String>, body: &[u8]) -> ResponseTemplate {
        let recurse = query.contains_key("recurse");
        match method {
            "GET" => {
                let pairs: Vec<Value> = self
                    .kv
                    .iter()
                    .filter(|(k, _)| if recurse { k.starts_with(key) } else { *k == key })
                    .map(|(k, e)| {
                        json!({
                            "Key": k,
                            "Value": STANDARD.encode(&e.value),
                            "Flags": e.flags,
                            "CreateIndex": e.create_index,
                            "ModifyIndex": e.modify_index,
                        })
                    })
                    .collect();
                if pairs.is_empty() {
                    return not_found("");
                }
                ok(Value::Array(pairs)).insert_header("X-Consul-Index", self.index.to_string().as_str())
            }
            "PUT" => {
                let current = self.kv.get(key).map(|e| e.modify_index).unwrap_or(0);
                if let Some(cas) = query.get("cas").and_then(|c| c.parse::<u64>().ok()) {
                    if cas != current {
                        return ok(json!(false));
                    }
                }
                let index = self.next_index();
                let create_index = self.kv.get(key).map(|e| e.create_index).unwrap_or(index);
                self.kv.insert(
                    key.to_string(),
                    KvEntry {
                        value: body.to_vec(),
                        flags: query.get("flags").and_then(|f| f.parse().ok()).unwrap_or(0),
                        create_index,
                        modify_index: index,
                    },
                );
                ok(json!(true))
            }
            _ => {
                if recurse {
                    self.kv.retain(|k, _| !k.starts_with(key));
                } else {
                    self.kv.remove(key);
                }
                ok(json!(true))
            }
        }
    }

    pub fn objects_of(&self, kind: &str) -> Vec<&Value> {
        self.objects
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, v)| v)
            .collect()
    }

    pub fn object(&self, kind: &'static str, id: &str) -> Option<&Value> {
        self.objects.get(&(kind, id.to_string()))
    }

    fn insert_object(&mut self, kind: &'static str, id: &str, mut doc: Value, id_field: &str) -> Value {
        let created = self
            .object(kind, id)
            .map(|existing| existing["CreateIndex"].clone());
        doc[id_field] = json!(id);
        self.stamp(&mut doc, created.is_none());
        if let Some(index) = created {
            doc["CreateIndex"] = index;
        }
        self.objects.insert((kind, id.to_string()), doc.clone());
        doc
    }

    /// Create from a PUT body, generating the id unless it is the name.
    fn create_object(&mut self, kind: &'static str, id_field: &str, doc: Value) -> ResponseTemplate {
        let id = match id_field {
            "ID" => uuid::Uuid::new_v4().to_string(),
            _ => doc[id_field].as_str().unwrap_or_default().to_string(),
        };
        ok(self.insert_object(kind, &id, doc, id_field))
    }

    fn read_object(&self, kind: &'static str, id: &str) -> Option<ResponseTemplate> {
        self.object(kind, id).map(|doc| ok(doc.clone()))
    }

    fn replace_object(&mut self, kind: &'static str, id_field: &str, id: &str, doc: Value) -> Option<ResponseTemplate> {
        self.object(kind, id)?;
        Some(ok(self.insert_object(kind, id, doc, id_field)))
    }

    fn remove_object(&mut self, kind: &'static str, id: &str) -> ResponseTemplate {
        self.objects.remove(&(kind, id.to_string()));
        ok(json!(true))
    }

    fn mark_deleted(&mut self, kind: &'static str, id: &str) -> ResponseTemplate {
        if let Some(doc) = self.objects.get_mut(&(kind, id.to_string())) {
            doc["DeletedAt"] = json!("2026-01-01T00:00:00Z");
        }
        ok(json!(true))
    }

    fn ca_configuration(&self) -> Value {
        if !self.ca.is_null() {
            return self.ca.clone();
        }
        json!({
            "Provider": "consul",
            "Config": {"LeafCertTTL": "72h", "RotationPeriod": "2160h", "IntermediateCertTTL": "8760h"},
        })
    }

    fn autopilot_configuration(&self) -> Value {
        if !self.autopilot.is_null() {
            return self.autopilot.clone();
        }
        json!({
            "CleanupDeadServers": true,
            "LastContactThreshold": "200ms",
            "MaxTrailingLogs": 250,
            "MinQuorum": 0,
            "ServerStabilizationTime": "10s",
            "RedundancyZoneTag": "",
            "DisableUpgradeMigration": false,
            "UpgradeVersionTag": "",
        })
    }

    fn license_reply(&self) -> Value {
        match &self.license {
            Some(_) => json!({
                "Valid": true,
                "License": {
                    "LicenseID": "lic-0001",
                    "CustomerID": "cust-0001",
                    "InstallationID": "*",
                    "IssueTime": "2026-01-01T00:00:00Z",
                    "StartTime": "2026-01-01T00:00:00Z",
                    "ExpirationTime": "2027-01-01T00:00:00Z",
                    "Product": "consul",
                    "Flags": {"modules": "governance-policy", "nodes": 100},
                    "Features": ["Namespaces", "Admin Partitions"],
                },
                "Warnings": null,
            }),
            None => json!({"Valid": false, "License": {}, "Warnings": ["no license installed"]}),
        }
    }

    fn stamp(&mut self, doc: &mut Value, created: bool) {
        let index = self.next_index();
        if created {
            doc["CreateIndex"] = json!(index);
        }
        doc["ModifyIndex"] = json!(index);
    }

    fn interfere(&mut self, accessor_id: &str) {
        let Some(pending) = self.interference.as_mut() else {
            return;
        };
        if pending.accessor_id != accessor_id {
            return;
        }
        if pending.after_reads > 0 {
            pending.after_reads -= 1;
            return;
        }
        let policy = pending.policy.clone();
        self.interference = None;
        let index = self.next_index();
        if let Some(token) = self.tokens.get_mut(accessor_id) {
            if let Some(links) = token["Policies"].as_array_mut() {
                links.push(json!({"Name": policy}));
            }
            token["ModifyIndex"] = json!(index);
        }
    }
}

/// The fake itself: every request is answered from the shared store.
#[derive(Clone, Default)]
pub struct FakeConsul {
    store: Arc<Mutex<Store>>,
}

impl FakeConsul {
    pub fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().expect("fake consul store poisoned")
    }

    /// Link `policy` to the token out of band once `after_reads` further
    /// reads of it have been served.
    pub fn interfere_with_token(&self, accessor_id: &str, policy: &str, after_reads: u32) {
        self.store().interference = Some(Interference {
            accessor_id: accessor_id.to_string(),
            policy: policy.to_string(),
            after_reads,
        });
    }

    pub fn count_requests(&self, prefix: &str) -> usize {
        self.store().requests.iter().filter(|r| r.starts_with(prefix)).count()
    }
}

impl Respond for FakeConsul {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let method = request.method.to_string();
        let path = percent_decode(request.url.path());
        let query: BTreeMap<String, String> = request
            .url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let mut store = self.store();
        store.requests.push(format!("{} {}", method, path));
        store.route(&method, &path, &query, &request.body)
    }
}

pub struct TestConsul {
    pub server: MockServer,
    pub fake: FakeConsul,
    pub ctx: ConsulContext,
}

impl TestConsul {
    pub async fn start() -> Self {
        init_tracing();
        let server = MockServer::start().await;
        let fake = FakeConsul::default();
        Mock::given(any())
            .respond_with(fake.clone())
            .mount(&server)
            .await;
        let ctx = ConsulContext::new(
            ConsulClient::with_base_url(server.uri()),
            ProviderDefaults::default(),
            5,
        );
        Self { server, fake, ctx }
    }
}

fn ok(body: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(body)
}

fn not_found(message: &str) -> ResponseTemplate {
    ResponseTemplate::new(404).set_body_string(message)
}

/// How servers report a missing ACL object.
fn acl_not_found() -> ResponseTemplate {
    ResponseTemplate::new(403).set_body_string("ACL not found")
}

fn parse(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap_or(Value::Null)
}

fn percent_decode(path: &str) -> String {
    urlencoding::decode(path)
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| path.to_string())
}

/// Servers echo whole minutes the way Go prints them.
fn go_duration(text: &str) -> String {
    match text.strip_suffix('m').and_then(|n| n.parse::<u64>().ok()) {
        Some(minutes) => format!("{}m0s", minutes),
        None => text.to_string(),
    }
}
