#![allow(clippy::unwrap_used)]
// End-to-end runs against a stateful fake controller: apply, verify,
// re-apply for idempotence, and rollback.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::path_regex;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use fabricctl_api::{RetryPolicy, Session};
use fabricctl_core::model::interface::{self, DESC};
use fabricctl_core::predicates::{self, PredicateConfig, PredicateContext, PredicateRegistry};
use fabricctl_core::{
    ChangeSet, CoreError, DeployMode, DeployState, Inventory, Orchestrator, PolicyFilter,
    PolicyStore, RunOptions, Snapshot, UnitFilter, UnitKey, WaitOutcome, compute_change_set,
};

// ── Fake controller ─────────────────────────────────────────────────

#[derive(Debug, Default)]
struct State {
    /// `(serial, ifName)` → `(policy, interface record)`.
    interfaces: BTreeMap<(String, String), (Value, Value)>,
    policies: BTreeMap<String, Value>,
    /// Units whose push the controller rejects.
    reject_push: BTreeSet<(String, String)>,
    deploys: Vec<String>,
    next_policy: u32,
}

#[derive(Clone)]
struct FakeController {
    state: Arc<Mutex<State>>,
}

impl FakeController {
    fn new() -> Self {
        let mut state = State::default();
        for (serial, name, desc) in [
            ("SN1", "Ethernet1/1", ""),
            ("SN1", "Ethernet1/2", "db"),
            ("SN2", "Ethernet1/1", ""),
        ] {
            let record = json!({
                "ifName": name,
                "serialNumber": serial,
                "nvPairs": {
                    "DESC": desc,
                    "CONF": "",
                    "PRIORITY": "450",
                    "FABRIC_NAME": "site",
                    "POLICY_ID": format!("POL-{serial}-{name}"),
                },
            });
            state.interfaces.insert(
                (serial.to_owned(), name.to_owned()),
                (json!("int_trunk_host"), record),
            );
        }
        state.policies.insert(
            "FF-1".into(),
            json!({
                "policyId": "FF-1",
                "serialNumber": "SN1",
                "templateName": "switch_freeform",
                "generatedConfig": "interface Ethernet1/1\n  description web-01\n",
            }),
        );
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn desc(&self, serial: &str, name: &str) -> String {
        let state = self.state.lock().unwrap();
        let (_, record) = &state.interfaces[&(serial.to_owned(), name.to_owned())];
        interface::nv_pair(&json!({"interfaces": [record]}), DESC)
            .unwrap()
            .to_owned()
    }

    fn query(request: &Request, key: &str) -> Option<String> {
        request
            .url
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    fn ok(body: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(body)
    }
}

impl Respond for FakeController {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let mut state = self.state.lock().unwrap();
        let path = request.url.path().trim_start_matches("/rest");
        let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);

        match (request.method.as_str(), path) {
            ("POST", "/logon") => Self::ok(json!({"Dcnm-Token": "tok"})),
            ("GET", "/inventory/switches") => Self::ok(json!([
                {"serialNumber": "SN1", "switchRole": "leaf", "fabricName": "site"},
                {"serialNumber": "SN2", "switchRole": "spine", "fabricName": "site"},
            ])),
            ("GET", "/interface") => {
                let serial = Self::query(request, "serialNumber").unwrap_or_default();
                let groups: Vec<Value> = state
                    .interfaces
                    .iter()
                    .filter(|((sn, _), _)| *sn == serial)
                    .map(|(_, (policy, record))| json!({"policy": policy, "interfaces": [record]}))
                    .collect();
                Self::ok(json!(groups))
            }
            ("PUT", "/interface") => {
                let policy = body["policy"].clone();
                let mut record = body["interfaces"][0].clone();
                let key = (
                    record["serialNumber"].as_str().unwrap_or_default().to_owned(),
                    record["ifName"].as_str().unwrap_or_default().to_owned(),
                );
                if state.reject_push.contains(&key) {
                    return ResponseTemplate::new(500).set_body_json(json!({"message": "rejected"}));
                }
                // The controller bumps the priority on every write.
                record["nvPairs"]["PRIORITY"] = json!("500");
                state.interfaces.insert(key, (policy, record));
                Self::ok(json!({}))
            }
            ("GET", "/control/policies/switches") => {
                let wanted = Self::query(request, "serialNumber").unwrap_or_default();
                let wanted: BTreeSet<&str> = wanted.split(',').collect();
                let policies: Vec<Value> = state
                    .policies
                    .values()
                    .filter(|p| wanted.contains(p["serialNumber"].as_str().unwrap_or_default()))
                    .cloned()
                    .collect();
                Self::ok(json!(policies))
            }
            ("POST", "/control/policies") => {
                state.next_policy += 1;
                let id = format!("FF-NEW-{}", state.next_policy);
                state.policies.insert(id, body);
                Self::ok(json!({}))
            }
            ("POST", "/control/policies/deploy") => {
                state.deploys.push(format!("policies:{body}"));
                Self::ok(json!({}))
            }
            ("POST", "/globalInterface/deploy") => {
                state.deploys.push(format!("interfaces:{}", body.as_array().map_or(0, Vec::len)));
                Self::ok(json!({}))
            }
            ("POST", p) if p.starts_with("/control/fabrics/site/config-deploy/") => {
                state.deploys.push(format!("switch:{}", p.rsplit('/').next().unwrap_or_default()));
                Self::ok(json!({}))
            }
            ("GET", "/control/fabrics/msd/fabric-associations") => {
                Self::ok(json!([{"fabricName": "site", "fabricId": 7}]))
            }
            ("GET", "/control/status") => Self::ok(json!([
                {"entityName": "SN1", "status": "In-Sync"},
                {"entityName": "SN2", "status": "In-Sync"},
            ])),
            ("DELETE", p) if p.starts_with("/control/policies/") => {
                let id = p.trim_start_matches("/control/policies/");
                if state.policies.remove(id).is_some() {
                    Self::ok(json!({}))
                } else {
                    ResponseTemplate::new(500).set_body_json(json!({"message": "missing"}))
                }
            }
            _ => ResponseTemplate::new(404),
        }
    }
}

async fn setup() -> (MockServer, FakeController, Session) {
    let server = MockServer::start().await;
    let fake = FakeController::new();
    Mock::given(path_regex("^/rest/"))
        .respond_with(fake.clone())
        .mount(&server)
        .await;

    let session = Session::with_client(reqwest::Client::new(), Url::parse(&server.uri()).unwrap())
        .with_retry(RetryPolicy::none());
    session
        .login("admin", &"secret".to_string().into())
        .await
        .unwrap();
    (server, fake, session)
}

fn options(mode: DeployMode) -> RunOptions {
    RunOptions {
        deploy_mode: mode,
        status_timeout: Duration::from_secs(5),
        status_interval: Duration::from_millis(10),
        ..RunOptions::default()
    }
}

fn desired() -> PredicateConfig {
    PredicateConfig {
        desired: Some(BTreeMap::from([
            (UnitKey::new("Ethernet1/1", "SN1"), "web-01".to_owned()),
            (UnitKey::new("Ethernet1/2", "SN1"), "db".to_owned()),
            (UnitKey::new("Ethernet1/1", "SN2"), "uplink-to-core".to_owned()),
        ])),
        ..PredicateConfig::default()
    }
}

/// Discover, fetch and diff with the `desc` predicate.
async fn plan(
    session: &Session,
    config: &PredicateConfig,
) -> (Inventory, ChangeSet, Snapshot) {
    let mut inventory = Inventory::new();
    inventory.discover(session, None).await.unwrap();

    let mut store = PolicyStore::new();
    store
        .fetch_units(session, &inventory, None, &UnitFilter::new())
        .await
        .unwrap();
    store
        .fetch_policies(
            session,
            &inventory,
            None,
            &PolicyFilter::new().template_name(|t: &str| t == "switch_freeform"),
        )
        .await
        .unwrap();

    let mut selected = PredicateRegistry::builtin().create(&["desc"]).unwrap();
    let ctx = PredicateContext {
        inventory: &inventory,
        policies: &store,
        config,
    };
    predicates::initialize_all(&mut selected, &ctx).unwrap();
    let (changes, snapshot) = compute_change_set(&store.units(), &inventory, &selected).unwrap();
    (inventory, changes, snapshot)
}

/// `interface X` / `description Y` pairs, line by line.
fn freeform_descriptions(text: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut current = None;
    for line in text.lines().map(str::trim) {
        if let Some(name) = line.strip_prefix("interface ") {
            current = Some(name.to_owned());
        } else if let (Some(desc), Some(name)) = (line.strip_prefix("description "), &current) {
            out.push((name.clone(), desc.to_owned()));
        }
    }
    out
}

// ── Apply / verify / idempotence ────────────────────────────────────

#[tokio::test]
async fn test_apply_verifies_and_is_idempotent() {
    let (_server, fake, session) = setup().await;
    let (inventory, changes, snapshot) = plan(&session, &desired()).await;

    assert_eq!(
        changes.keys().cloned().collect::<Vec<_>>(),
        vec![
            UnitKey::new("Ethernet1/1", "SN1"),
            UnitKey::new("Ethernet1/1", "SN2"),
        ]
    );
    assert_eq!(snapshot.len(), 2);

    let orchestrator = Orchestrator::new(&session, &inventory, options(DeployMode::Interface));
    let report = orchestrator
        .run(&changes, &[], &CancellationToken::new(), &mut ())
        .await
        .unwrap();

    assert!(report.is_clean(), "{report:?}");
    assert_eq!(report.push.success().len(), 2);
    assert_eq!(report.wait, Some(WaitOutcome::Reached));
    assert!(report.verify.as_ref().unwrap().is_clean());
    assert_eq!(fake.desc("SN1", "Ethernet1/1"), "web-01");
    assert_eq!(fake.desc("SN2", "Ethernet1/1"), "uplink-to-core");
    assert_eq!(fake.state.lock().unwrap().deploys, vec!["interfaces:2".to_owned()]);

    let (_, again, _) = plan(&session, &desired()).await;
    assert!(again.is_empty());
}

#[tokio::test]
async fn test_rollback_restores_original_payloads() {
    let (_server, fake, session) = setup().await;
    let (inventory, changes, snapshot) = plan(&session, &desired()).await;
    let orchestrator = Orchestrator::new(&session, &inventory, options(DeployMode::Switch));

    orchestrator
        .run(&changes, &[], &CancellationToken::new(), &mut ())
        .await
        .unwrap();
    assert_eq!(fake.desc("SN1", "Ethernet1/1"), "web-01");

    // The snapshot survives a trip through its file form.
    let text = serde_json::to_string(&snapshot).unwrap();
    let restored: Snapshot = serde_json::from_str(&text).unwrap();

    let report = orchestrator
        .rollback(&restored, &CancellationToken::new(), &mut ())
        .await
        .unwrap();
    assert!(report.is_clean(), "{report:?}");
    assert_eq!(fake.desc("SN1", "Ethernet1/1"), "");
    assert_eq!(fake.desc("SN2", "Ethernet1/1"), "");
    assert_eq!(fake.desc("SN1", "Ethernet1/2"), "db");

    let deploys = fake.state.lock().unwrap().deploys.clone();
    assert_eq!(
        deploys,
        vec!["switch:SN1", "switch:SN2", "switch:SN1", "switch:SN2"]
    );
}

// ── Superseded policies ─────────────────────────────────────────────

#[tokio::test]
async fn test_freeform_descriptions_replace_policy_and_roll_back() {
    let (_server, fake, session) = setup().await;
    let config = PredicateConfig {
        description_source: Some(Arc::new(freeform_descriptions)),
        ..PredicateConfig::default()
    };
    let (inventory, changes, snapshot) = plan(&session, &config).await;

    assert_eq!(
        changes.keys().cloned().collect::<Vec<_>>(),
        vec![UnitKey::new("Ethernet1/1", "SN1")]
    );
    let superseded = snapshot.superseded_policies().to_vec();
    assert_eq!(superseded.len(), 1);
    assert_eq!(superseded[0].policy_id, "FF-1");

    let orchestrator = Orchestrator::new(&session, &inventory, options(DeployMode::Interface));
    let report = orchestrator
        .run(&changes, &superseded, &CancellationToken::new(), &mut ())
        .await
        .unwrap();
    assert!(report.deleted_policies.is_success(&"FF-1".to_owned()));
    assert!(!fake.state.lock().unwrap().policies.contains_key("FF-1"));
    assert_eq!(fake.desc("SN1", "Ethernet1/1"), "web-01");

    let report = orchestrator
        .rollback(&snapshot, &CancellationToken::new(), &mut ())
        .await
        .unwrap();
    assert!(report.recreated_policies.is_success(&"FF-1".to_owned()));
    assert!(report.policy_deploy.as_ref().unwrap().is_acked());
    assert_eq!(fake.desc("SN1", "Ethernet1/1"), "");

    let state = fake.state.lock().unwrap();
    assert_eq!(state.policies.len(), 1);
    assert!(state.deploys.iter().any(|d| d.starts_with("policies:")));
}

#[tokio::test]
async fn test_failed_push_after_delete_stops_before_deploy() {
    let (_server, fake, session) = setup().await;
    let config = PredicateConfig {
        description_source: Some(Arc::new(freeform_descriptions)),
        ..PredicateConfig::default()
    };
    let (inventory, changes, snapshot) = plan(&session, &config).await;
    fake.state
        .lock()
        .unwrap()
        .reject_push
        .insert(("SN1".to_owned(), "Ethernet1/1".to_owned()));

    let orchestrator = Orchestrator::new(&session, &inventory, options(DeployMode::Interface));
    let err = orchestrator
        .run(
            &changes,
            snapshot.superseded_policies(),
            &CancellationToken::new(),
            &mut (),
        )
        .await
        .unwrap_err();

    match err {
        CoreError::PolicyConsistency {
            deleted_policies,
            failed_units,
        } => {
            assert_eq!(deleted_policies, vec!["FF-1".to_owned()]);
            assert_eq!(failed_units, vec![UnitKey::new("Ethernet1/1", "SN1")]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(fake.state.lock().unwrap().deploys.is_empty());
}

#[tokio::test]
async fn test_cancelled_before_start_pushes_nothing() {
    let (server, fake, session) = setup().await;
    let (inventory, changes, _) = plan(&session, &desired()).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let orchestrator = Orchestrator::new(&session, &inventory, options(DeployMode::Interface));
    let report = orchestrator
        .run(&changes, &[], &cancel, &mut ())
        .await
        .unwrap();

    assert!(report.cancelled);
    assert!(!report.is_clean());
    assert!(report.push.is_empty());
    assert!(report.deploy.jobs.is_empty());
    assert!(report.wait.is_none());
    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.method.as_str() != "PUT"));
    assert!(fake.state.lock().unwrap().deploys.is_empty());
}

#[tokio::test]
async fn test_cancel_interrupts_slow_deploy() {
    let (server, _fake, session) = setup().await;
    Mock::given(path_regex("^/rest/globalInterface/deploy$"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(4)))
        .with_priority(1)
        .mount(&server)
        .await;
    let (inventory, changes, _) = plan(&session, &desired()).await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let orchestrator = Orchestrator::new(&session, &inventory, options(DeployMode::Interface));
    let started = std::time::Instant::now();
    let report = orchestrator
        .run(&changes, &[], &cancel, &mut ())
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(report.cancelled);
    // The push finished before the cancel and stays in the report.
    assert_eq!(report.push.success().len(), changes.len());
    assert_eq!(report.deploy.jobs.len(), 1);
    assert_eq!(report.deploy.jobs[0].state, DeployState::Rejected);
    assert!(report.deploy.acked_serials().is_empty());
    assert!(report.wait.is_none());
    assert!(report.verify.is_none());
}

#[tokio::test]
async fn test_rollback_rejects_unknown_switch() {
    let (_server, _fake, session) = setup().await;
    let (_, _, snapshot) = plan(&session, &desired()).await;
    let inventory = Inventory::new();
    let orchestrator = Orchestrator::new(&session, &inventory, options(DeployMode::Interface));
    let err = orchestrator
        .rollback(&snapshot, &CancellationToken::new(), &mut ())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Snapshot { .. }));
}
