use super::*;
use crate::client::{ClientError, PolicyContentFormat, PolicyContractProperties};
use crate::schema::ApiPolicyConfig;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

const SUBSCRIPTION: &str = "00000000-0000-0000-0000-000000000000";
const POLICY_ID: &str = "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/rg1/providers/Microsoft.ApiManagement/service/svc1/apis/api1/policies/policy";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Get,
    Put(PolicyContract),
    Delete,
}

/// In-memory stand-in for the management API
///
/// Links are "downloaded" from `links`, and content is stored HTML-escaped,
/// the way the service exports it.
#[derive(Default)]
struct FakeClient {
    policies: Mutex<HashMap<String, String>>,
    links: HashMap<String, String>,
    calls: Mutex<Vec<Call>>,
    get_status: Mutex<Option<u16>>,
    put_status: Mutex<Option<u16>>,
    delete_status: Mutex<Option<u16>>,
    omit_id: AtomicBool,
    hang: AtomicBool,
}

impl FakeClient {
    fn with_links(links: &[(&str, &str)]) -> Self {
        Self {
            links: links
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            ..Self::default()
        }
    }

    fn seed(&self, id: &str, content: &str) {
        self.policies
            .lock()
            .unwrap()
            .insert(id.to_string(), content.to_string());
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn puts(&self) -> Vec<PolicyContract> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Put(body) => Some(body),
                _ => None,
            })
            .collect()
    }

    fn stored(&self, id: &str) -> Option<String> {
        self.policies.lock().unwrap().get(id).cloned()
    }

    fn failure(status: &Mutex<Option<u16>>) -> Option<ClientError> {
        status.lock().unwrap().map(|status| ClientError::Status {
            status,
            code: None,
            message: format!("injected {status}"),
        })
    }
}

#[async_trait]
impl ApiPolicyClient for FakeClient {
    async fn get(
        &self,
        id: &ApiPolicyId,
        format: PolicyExportFormat,
    ) -> Result<PolicyContract, ClientError> {
        assert_eq!(format, PolicyExportFormat::Xml);
        self.calls.lock().unwrap().push(Call::Get);
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if let Some(e) = Self::failure(&self.get_status) {
            return Err(e);
        }
        let Some(content) = self.stored(&id.id()) else {
            return Err(ClientError::not_found("policy not found"));
        };
        Ok(PolicyContract {
            id: (!self.omit_id.load(Ordering::SeqCst)).then(|| id.id()),
            name: Some("policy".to_string()),
            resource_type: Some("Microsoft.ApiManagement/service/apis/policies".to_string()),
            properties: Some(PolicyContractProperties {
                value: Some(html_escape::encode_text(&content).into_owned()),
                format: Some(PolicyContentFormat::Xml),
            }),
        })
    }

    async fn create_or_update(
        &self,
        id: &ApiPolicyId,
        parameters: &PolicyContract,
        if_match: Option<&str>,
    ) -> Result<PolicyContract, ClientError> {
        assert!(if_match.is_none());
        self.calls
            .lock()
            .unwrap()
            .push(Call::Put(parameters.clone()));
        if let Some(e) = Self::failure(&self.put_status) {
            return Err(e);
        }
        let properties = parameters.properties.clone().unwrap_or_default();
        let value = properties.value.unwrap_or_default();
        let content = match properties.format {
            Some(PolicyContentFormat::RawXmlLink) => self
                .links
                .get(&value)
                .cloned()
                .ok_or_else(|| ClientError::Status {
                    status: 400,
                    code: Some("ValidationError".to_string()),
                    message: "link could not be downloaded".to_string(),
                })?,
            _ => value,
        };
        self.seed(&id.id(), &content);
        Ok(parameters.clone())
    }

    async fn delete(&self, id: &ApiPolicyId, if_match: Option<&str>) -> Result<(), ClientError> {
        assert!(if_match.is_none());
        self.calls.lock().unwrap().push(Call::Delete);
        if let Some(e) = Self::failure(&self.delete_status) {
            return Err(e);
        }
        match self.policies.lock().unwrap().remove(&id.id()) {
            Some(_) => Ok(()),
            None => Err(ClientError::not_found("policy not found")),
        }
    }
}

fn reconciler(client: &Arc<FakeClient>) -> ApiPolicyReconciler {
    let client: Arc<dyn ApiPolicyClient> = Arc::<FakeClient>::clone(client);
    ApiPolicyReconciler::new(
        client,
        Some(SUBSCRIPTION.to_string()),
        ResourceTimeouts::default(),
    )
}

fn config(xml_content: Option<&str>, xml_link: Option<&str>) -> ApiPolicyConfig {
    ApiPolicyConfig {
        resource_group_name: "rg1".to_string(),
        api_management_name: "svc1".to_string(),
        api_name: "api1".to_string(),
        xml_content: xml_content.map(str::to_string),
        xml_link: xml_link.map(str::to_string),
    }
}

fn tracked(xml_content: &str, xml_link: &str) -> ResourceData {
    let mut data = ResourceData::for_create(&config(Some(xml_content), Some(xml_link)));
    data.set_new_resource(false);
    data.set_id(POLICY_ID);
    data
}

#[test]
fn test_select_policy_body_priority() {
    assert_eq!(
        select_policy_body("<policies/>", "https://example.com/p.xml").unwrap(),
        PolicyBody::XmlLink("https://example.com/p.xml".to_string())
    );
    assert_eq!(
        select_policy_body("<policies/>", "").unwrap(),
        PolicyBody::InlineXml("<policies/>".to_string())
    );
    assert!(matches!(
        select_policy_body("", ""),
        Err(ReconcileError::MissingPolicyBody)
    ));
}

#[tokio::test]
async fn test_create_without_body_makes_no_calls() {
    let client = Arc::new(FakeClient::default());
    let mut data = ResourceData::for_create(&config(None, None));

    let err = reconciler(&client)
        .create_or_update(&mut data, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::MissingPolicyBody));
    assert_eq!(err.to_string(), "Either `xml_content` or `xml_link` must be set");
    assert!(client.calls().is_empty());
    assert!(!data.is_tracked());
}

#[tokio::test]
async fn test_update_without_body_makes_no_calls() {
    let client = Arc::new(FakeClient::default());
    let mut data = tracked("", "");

    let err = reconciler(&client)
        .create_or_update(&mut data, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::MissingPolicyBody));
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn test_create_scenario_sets_canonical_id() {
    let client = Arc::new(FakeClient::default());
    let mut data = ResourceData::for_create(&config(Some("<policies><inbound/></policies>"), None));

    reconciler(&client)
        .create_or_update(&mut data, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(data.id(), POLICY_ID);
    assert_eq!(data.xml_content(), "<policies><inbound/></policies>");
    assert_eq!(data.xml_link(), "");
    // presence check, write, id lookup, refresh
    assert_eq!(
        client.calls(),
        vec![
            Call::Get,
            Call::Put(PolicyContract::from(PolicyBody::InlineXml(
                "<policies><inbound/></policies>".to_string()
            ))),
            Call::Get,
            Call::Get,
        ]
    );

    // A later read returns the same content
    let mut refreshed = ResourceData::for_import(POLICY_ID);
    reconciler(&client)
        .read(&mut refreshed, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(refreshed.xml_content(), "<policies><inbound/></policies>");
    assert_eq!(refreshed.resource_group_name(), "rg1");
    assert_eq!(refreshed.api_management_name(), "svc1");
    assert_eq!(refreshed.api_name(), "api1");
}

#[tokio::test]
async fn test_round_trip_unescapes_and_leaves_link_untouched() {
    let client = Arc::new(FakeClient::default());
    let mut data = ResourceData::for_create(&config(Some("<policies/>"), None));
    let reconciler = reconciler(&client);
    reconciler
        .create_or_update(&mut data, &CancellationToken::new())
        .await
        .unwrap();

    // Stored raw; the fake exports it escaped on every read
    assert_eq!(client.stored(POLICY_ID).as_deref(), Some("<policies/>"));

    data.set_xml_link("https://example.com/previous.xml");
    reconciler
        .read(&mut data, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(data.xml_content(), "<policies/>");
    assert_eq!(data.xml_link(), "https://example.com/previous.xml");
}

#[tokio::test]
async fn test_link_takes_priority_over_content() {
    let client = Arc::new(FakeClient::with_links(&[(
        "https://example.com/policy.xml",
        "<policies><outbound/></policies>",
    )]));
    let mut data = ResourceData::for_create(&config(
        Some("<policies><inbound/></policies>"),
        Some("https://example.com/policy.xml"),
    ));

    reconciler(&client)
        .create_or_update(&mut data, &CancellationToken::new())
        .await
        .unwrap();

    let puts = client.puts();
    assert_eq!(puts.len(), 1);
    let properties = puts[0].properties.clone().unwrap();
    assert_eq!(properties.format, Some(PolicyContentFormat::RawXmlLink));
    assert_eq!(
        properties.value.as_deref(),
        Some("https://example.com/policy.xml")
    );
    // The service resolved the link into content; the link stays as configured
    assert_eq!(data.xml_content(), "<policies><outbound/></policies>");
    assert_eq!(data.xml_link(), "https://example.com/policy.xml");
}

#[tokio::test]
async fn test_create_refuses_existing_policy() {
    let client = Arc::new(FakeClient::default());
    client.seed(POLICY_ID, "<policies/>");
    let mut data = ResourceData::for_create(&config(Some("<policies><inbound/></policies>"), None));

    let err = reconciler(&client)
        .create_or_update(&mut data, &CancellationToken::new())
        .await
        .unwrap_err();

    match &err {
        ReconcileError::AlreadyExists { id, resource_type } => {
            assert_eq!(id, POLICY_ID);
            assert_eq!(*resource_type, "azurerm_api_management_api_policy");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().contains(POLICY_ID));
    assert!(client.puts().is_empty());
    assert!(!data.is_tracked());
}

#[tokio::test]
async fn test_update_skips_presence_check() {
    let client = Arc::new(FakeClient::default());
    client.seed(POLICY_ID, "<policies/>");
    let mut data = tracked("<policies><inbound/></policies>", "");

    reconciler(&client)
        .create_or_update(&mut data, &CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(client.calls()[0], Call::Put(_)));
    assert_eq!(
        client.stored(POLICY_ID).as_deref(),
        Some("<policies><inbound/></policies>")
    );
}

#[tokio::test]
async fn test_update_from_link_to_content() {
    let client = Arc::new(FakeClient::with_links(&[(
        "https://example.com/policy.xml",
        "<policies><outbound/></policies>",
    )]));
    let reconciler = reconciler(&client);
    let mut data = ResourceData::for_create(&config(None, Some("https://example.com/policy.xml")));
    reconciler
        .create_or_update(&mut data, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(data.xml_content(), "<policies><outbound/></policies>");

    // Dropping the link from configuration already empties it in state,
    // so the update sends inline content
    data.apply_config(&config(Some("<policies><inbound/></policies>"), None));
    assert_eq!(data.xml_link(), "");
    reconciler
        .create_or_update(&mut data, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(data.xml_link(), "");
    assert_eq!(data.xml_content(), "<policies><inbound/></policies>");
    let puts = client.puts();
    assert_eq!(puts.len(), 2);
    assert_eq!(
        puts[1].properties.as_ref().and_then(|p| p.format),
        Some(PolicyContentFormat::RawXml)
    );
}

#[test]
fn test_clear_superseded_link_only_on_update() {
    let inline = PolicyBody::InlineXml("<policies/>".to_string());
    let link = PolicyBody::XmlLink("https://example.com/policy.xml".to_string());

    let mut updating = tracked("<policies/>", "https://example.com/stale.xml");
    clear_superseded_link(&mut updating, &link);
    assert_eq!(updating.xml_link(), "https://example.com/stale.xml");
    clear_superseded_link(&mut updating, &inline);
    assert_eq!(updating.xml_link(), "");

    let mut creating =
        ResourceData::for_create(&config(Some("<policies/>"), Some("https://example.com/stale.xml")));
    clear_superseded_link(&mut creating, &inline);
    assert_eq!(creating.xml_link(), "https://example.com/stale.xml");
}

#[tokio::test]
async fn test_presence_check_failure() {
    let client = Arc::new(FakeClient::default());
    *client.get_status.lock().unwrap() = Some(500);
    let mut data = ResourceData::for_create(&config(Some("<policies/>"), None));

    let err = reconciler(&client)
        .create_or_update(&mut data, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::CheckingPresence { .. }));
    assert!(err.to_string().starts_with(
        "checking for presence of existing API Policy (Resource Group \"rg1\" / API Management Service \"svc1\" / API \"api1\")"
    ));
    assert!(client.puts().is_empty());
}

#[tokio::test]
async fn test_write_failure() {
    let client = Arc::new(FakeClient::default());
    *client.put_status.lock().unwrap() = Some(400);
    let mut data = ResourceData::for_create(&config(Some("<policies/>"), None));

    let err = reconciler(&client)
        .create_or_update(&mut data, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::CreatingOrUpdating { .. }));
    assert!(err.to_string().contains("injected 400"));
    assert!(!data.is_tracked());
}

#[tokio::test]
async fn test_missing_id_after_write() {
    let client = Arc::new(FakeClient::default());
    client.omit_id.store(true, Ordering::SeqCst);
    let mut data = ResourceData::for_create(&config(Some("<policies/>"), None));

    let err = reconciler(&client)
        .create_or_update(&mut data, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::MissingId { .. }));
    assert!(!data.is_tracked());
}

#[test]
fn test_target_resolves_without_calls() {
    let client = Arc::new(FakeClient::default());
    let data = ResourceData::for_create(&config(Some("<policies/>"), None));
    let id = reconciler(&client).target(&data).unwrap();
    assert_eq!(id.id(), POLICY_ID);
    assert!(client.calls().is_empty());

    let empty = ResourceData::for_create(&config(None, None));
    assert!(matches!(
        reconciler(&client).target(&empty),
        Err(ReconcileError::MissingPolicyBody)
    ));
}

#[tokio::test]
async fn test_create_without_subscription() {
    let client = Arc::new(FakeClient::default());
    let dyn_client: Arc<dyn ApiPolicyClient> = Arc::<FakeClient>::clone(&client);
    let reconciler = ApiPolicyReconciler::new(dyn_client, None, ResourceTimeouts::default());
    let mut data = ResourceData::for_create(&config(Some("<policies/>"), None));

    let err = reconciler
        .create_or_update(&mut data, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::MissingSubscription { .. }));
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn test_update_uses_subscription_from_stored_id() {
    let client = Arc::new(FakeClient::default());
    let other = POLICY_ID.replace(SUBSCRIPTION, "11111111-1111-1111-1111-111111111111");
    client.seed(&other, "<policies/>");
    let mut data = tracked("<policies><inbound/></policies>", "");
    data.set_id(other.clone());

    reconciler(&client)
        .create_or_update(&mut data, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(data.id(), other);
    assert_eq!(
        client.stored(&other).as_deref(),
        Some("<policies><inbound/></policies>")
    );
    assert!(client.stored(POLICY_ID).is_none());
}

#[tokio::test]
async fn test_read_absent_policy_clears_id() {
    let client = Arc::new(FakeClient::default());
    let mut data = tracked("<policies/>", "");

    reconciler(&client)
        .read(&mut data, &CancellationToken::new())
        .await
        .unwrap();

    assert!(!data.is_tracked());
    assert_eq!(data.xml_content(), "<policies/>");
}

#[tokio::test]
async fn test_read_invalid_id_makes_no_calls() {
    let client = Arc::new(FakeClient::default());
    let mut data = ResourceData::for_import("/subscriptions/sub/resourceGroups/rg1");

    let err = reconciler(&client)
        .read(&mut data, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::InvalidId(_)));
    assert_eq!(err.to_string(), "ID was missing the `providers` element");
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn test_read_failure() {
    let client = Arc::new(FakeClient::default());
    *client.get_status.lock().unwrap() = Some(503);
    let mut data = tracked("<policies/>", "");

    let err = reconciler(&client)
        .read(&mut data, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::Reading { .. }));
    assert!(err.to_string().starts_with("making Read request for Api Policy:"));
    assert!(data.is_tracked());
}

#[tokio::test]
async fn test_read_overwrites_key_fields_from_id() {
    let client = Arc::new(FakeClient::default());
    client.seed(POLICY_ID, "<policies/>");
    let mut data = tracked("<policies/>", "");
    data.set_resource_group_name("stale");
    data.set_api_name("stale");

    reconciler(&client)
        .read(&mut data, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(data.resource_group_name(), "rg1");
    assert_eq!(data.api_name(), "api1");
}

#[tokio::test]
async fn test_delete_twice_is_idempotent() {
    let client = Arc::new(FakeClient::default());
    client.seed(POLICY_ID, "<policies/>");
    let data = tracked("<policies/>", "");
    let reconciler = reconciler(&client);

    reconciler
        .delete(&data, &CancellationToken::new())
        .await
        .unwrap();
    reconciler
        .delete(&data, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(client.calls(), vec![Call::Delete, Call::Delete]);
    assert!(client.stored(POLICY_ID).is_none());
}

#[tokio::test]
async fn test_delete_failure() {
    let client = Arc::new(FakeClient::default());
    *client.delete_status.lock().unwrap() = Some(409);
    let data = tracked("<policies/>", "");

    let err = reconciler(&client)
        .delete(&data, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::Deleting { .. }));
    assert!(err.to_string().starts_with("deleting Api Policy:"));
}

#[tokio::test]
async fn test_delete_invalid_id() {
    let client = Arc::new(FakeClient::default());
    let data = ResourceData::for_import("not-an-id");

    let err = reconciler(&client)
        .delete(&data, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::InvalidId(_)));
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn test_cancelled_read() {
    let client = Arc::new(FakeClient::default());
    client.hang.store(true, Ordering::SeqCst);
    let mut data = tracked("<policies/>", "");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = reconciler(&client)
        .read(&mut data, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::Cancelled { operation: "read" }));
    assert!(data.is_tracked());
}

#[tokio::test]
async fn test_read_times_out() {
    let client = Arc::new(FakeClient::default());
    client.hang.store(true, Ordering::SeqCst);
    let dyn_client: Arc<dyn ApiPolicyClient> = Arc::<FakeClient>::clone(&client);
    let timeouts = ResourceTimeouts {
        read: Duration::from_millis(20),
        ..ResourceTimeouts::default()
    };
    let reconciler = ApiPolicyReconciler::new(dyn_client, Some(SUBSCRIPTION.to_string()), timeouts);
    let mut data = tracked("<policies/>", "");

    let err = reconciler
        .read(&mut data, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        ReconcileError::TimedOut { operation, after } => {
            assert_eq!(operation, "read");
            assert_eq!(after, Duration::from_millis(20));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
