//! End-to-end client behavior over an in-memory transport

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::NaiveDate;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use serde_json::{json, Value};
use sha2::Sha256;

use furs::bundle::PemBundle;
use furs::transport::memory::MemoryTransport;
use furs::{
    build_header, encode, ClientConfig, Environment, Error, FursClient, FursEnv, Identity, Invoice,
    InvoiceIdentifier, JsonCodec, Signer, TaxesPerSeller, Vat,
};

const BUNDLE: &[u8] = include_bytes!("fixtures/bundle-test.pem");
const PASSWORD: &str = "Geslo123";
const EOR: &str = "6e2b9c0a-8f1d-4b7e-a1c3-5d9e2f4a6b80";

/// Server-side signer for reply tokens; clients never check it
struct ServerSigner;

impl Signer for ServerSigner {
    fn algorithm(&self) -> &str {
        "RS256"
    }

    fn sign(&self, _message: &[u8]) -> furs::Result<Vec<u8>> {
        Ok(b"server-signature".to_vec())
    }
}

fn signed_reply(payload: Value) -> Vec<u8> {
    let server = Identity::new("CN=blagajne-test.fu.gov.si", "CN=Test CA", 99u64);
    let token = encode(
        &build_header(&server, "RS256"),
        &payload,
        &ServerSigner,
        &JsonCodec::compact(),
    )
    .unwrap();
    serde_json::to_vec(&json!({ "token": token.as_str() })).unwrap()
}

fn client(transport: MemoryTransport) -> (FursClient<MemoryTransport>, RsaPublicKey) {
    let bundle = PemBundle::parse(BUNDLE).unwrap();
    let identity = bundle.client_identity("DavPotRacTEST", Some(PASSWORD)).unwrap();
    let public_key = bundle.private_key(Some(PASSWORD)).unwrap().to_public_key();

    let client = FursClient::new(
        FursEnv::test().unwrap(),
        identity.identity,
        identity.signer,
        JsonCodec::compact(),
        transport,
    );
    (client, public_key)
}

fn invoice() -> Invoice {
    let issued = NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(9, 5, 7)
        .unwrap();
    let vat = Vat::new(
        "22.00".parse().unwrap(),
        "10.00".parse().unwrap(),
        "2.20".parse().unwrap(),
    );
    Invoice::new(
        12345678,
        issued,
        InvoiceIdentifier::new("TRGOVINA1", "BLAG2", "42"),
        "12.20".parse().unwrap(),
    )
    .with_taxes(TaxesPerSeller::default().with_vat(vat))
}

fn segment_json(segment: &str) -> Value {
    serde_json::from_slice(&URL_SAFE_NO_PAD.decode(segment).unwrap()).unwrap()
}

#[tokio::test]
async fn test_echo_is_plain_json() {
    let (client, _) = client(MemoryTransport::replying(r#"{"EchoResponse":"ping"}"#));

    assert_eq!(client.echo("ping").await.unwrap(), "ping");

    let requests = client.transport().requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].url.as_str(),
        "https://blagajne-test.fu.gov.si:9002/v1/cash_registers/echo"
    );
    assert_eq!(requests[0].body, br#"{"EchoRequest":"ping"}"#);
}

#[tokio::test]
async fn test_invoice_is_signed_and_returns_eor() {
    let reply = signed_reply(json!({
        "InvoiceResponse": {
            "Header": {"MessageID": "0a8f1c2e-5d1b-4b8a-9e33-4d7c2a1b9f00", "DateTime": "2024-03-01T09:05:08"},
            "UniqueInvoiceID": EOR
        }
    }));
    let (client, public_key) = client(MemoryTransport::replying(reply));

    let eor = client.invoice(invoice()).await.unwrap();
    assert_eq!(eor.to_string(), EOR);

    let requests = client.transport().requests();
    assert_eq!(
        requests[0].url.as_str(),
        "https://blagajne-test.fu.gov.si:9002/v1/cash_registers/invoices"
    );

    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let token = body["token"].as_str().unwrap();
    let segments: Vec<&str> = token.split('.').collect();
    assert_eq!(segments.len(), 3);

    let header = segment_json(segments[0]);
    assert_eq!(header["alg"], "RS256");
    assert_eq!(header["issuer_name"], "CN=Test CA, O=state-institutions, C=SI");
    assert_eq!(header["serial"].to_string(), "506179927174465497198103308");

    let payload = segment_json(segments[1]);
    let sent = &payload["InvoiceRequest"]["Invoice"];
    assert_eq!(sent["TaxNumber"], 12345678);
    assert_eq!(sent["InvoiceAmount"].to_string(), "12.20");
    assert_eq!(sent["ProtectedID"].as_str().unwrap().len(), 32);
    assert!(payload["InvoiceRequest"]["Header"]["MessageID"].is_string());

    let signature = Signature::try_from(URL_SAFE_NO_PAD.decode(segments[2]).unwrap().as_slice()).unwrap();
    let signing_input = format!("{}.{}", segments[0], segments[1]);
    VerifyingKey::<Sha256>::new(public_key)
        .verify(signing_input.as_bytes(), &signature)
        .unwrap();
}

#[tokio::test]
async fn test_protected_id_matches_client_computation() {
    let reply = signed_reply(json!({"InvoiceResponse": {"UniqueInvoiceID": EOR}}));
    let (client, _) = client(MemoryTransport::replying(reply));

    let expected = client.protected_id(&invoice()).unwrap();
    client.invoice(invoice()).await.unwrap();

    let body: Value = serde_json::from_slice(&client.transport().requests()[0].body).unwrap();
    let token = body["token"].as_str().unwrap();
    let payload = segment_json(token.split('.').nth(1).unwrap());
    assert_eq!(payload["InvoiceRequest"]["Invoice"]["ProtectedID"], expected.as_str());
}

#[tokio::test]
async fn test_duplicate_invoice_is_a_domain_error() {
    let reply = signed_reply(json!({
        "InvoiceResponse": {"Error": {"ErrorCode": "V202", "ErrorMessage": "Duplicate invoice"}}
    }));
    let (client, _) = client(MemoryTransport::replying(reply));

    match client.invoice(invoice()).await {
        Err(Error::Domain { code, message }) => {
            assert_eq!(code.as_deref(), Some("V202"));
            assert_eq!(message, "Duplicate invoice");
        }
        other => panic!("expected domain error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_reply_is_incomplete() {
    let (client, _) = client(MemoryTransport::replying(signed_reply(json!({}))));
    assert!(matches!(
        client.invoice(invoice()).await,
        Err(Error::IncompleteResponse(_))
    ));
}

#[tokio::test]
async fn test_invalid_invoice_is_not_sent() {
    let (client, _) = client(MemoryTransport::replying("{}"));

    let mut bad = invoice();
    bad.tax_number = 1234;
    assert!(matches!(
        client.invoice(bad).await,
        Err(Error::InvalidInput(_))
    ));
    assert!(client.transport().requests().is_empty());
}

#[tokio::test]
async fn test_non_https_endpoint_is_rejected() {
    let bundle = PemBundle::parse(BUNDLE).unwrap();
    let identity = bundle.client_identity("DavPotRacTEST", Some(PASSWORD)).unwrap();
    let config = ClientConfig::new(Environment::Test, "unused.pem")
        .with_base_url("http://blagajne-test.fu.gov.si:9002/v1");

    let client = FursClient::new(
        config.furs_env().unwrap(),
        identity.identity,
        identity.signer,
        config.json_codec(),
        MemoryTransport::replying(r#"{"EchoResponse":"ping"}"#),
    );

    assert!(matches!(
        client.echo("ping").await,
        Err(Error::InvalidInput(_))
    ));
    assert!(client.transport().requests().is_empty());
}

#[tokio::test]
async fn test_transport_errors_pass_through() {
    let transport = MemoryTransport::new(|_, _| {
        Err(Error::Api {
            status: 503,
            message: "maintenance".into(),
        })
    });
    let (client, _) = client(transport);

    assert!(matches!(
        client.echo("ping").await,
        Err(Error::Api { status: 503, .. })
    ));
}

#[tokio::test]
async fn test_business_premise_registration() {
    use furs::api::{BpIdentifier, PremiseType, SoftwareSupplier};
    use furs::BusinessPremise;

    let reply = signed_reply(json!({"BusinessPremiseResponse": {
        "Header": {"MessageID": "0a8f1c2e-5d1b-4b8a-9e33-4d7c2a1b9f00", "DateTime": "2024-03-01T09:05:08"}
    }}));
    let (client, _) = client(MemoryTransport::replying(reply));

    let premise = BusinessPremise::new(
        12345678,
        "STOJNICA1",
        BpIdentifier::Movable(PremiseType::FixedObject),
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
    )
    .with_software_supplier(SoftwareSupplier::domestic(87654321));

    client.business_premise(premise).await.unwrap();

    let requests = client.transport().requests();
    assert_eq!(
        requests[0].url.as_str(),
        "https://blagajne-test.fu.gov.si:9002/v1/cash_registers/invoices/register"
    );
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let payload = segment_json(body["token"].as_str().unwrap().split('.').nth(1).unwrap());
    assert_eq!(
        payload["BusinessPremiseRequest"]["BusinessPremise"]["BPIdentifier"]["PremiseType"],
        "B"
    );
}

#[tokio::test]
async fn test_client_is_shareable_across_tasks() {
    let (client, _) = client(MemoryTransport::replying(r#"{"EchoResponse":"ping"}"#));
    let client = std::sync::Arc::new(client);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.echo("ping").await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), "ping");
    }
    assert_eq!(client.transport().requests().len(), 4);
}
