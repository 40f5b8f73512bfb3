//! FURS client
//!
//! Each call is one request and one response: build the record, sign it if
//! the operation requires it, send it, and interpret the reply. Nothing is
//! retried or queued; a failed invoice is the caller's to resubmit (with
//! `SubsequentSubmit` set, if it was already handed to the customer).

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::api::{
    BusinessPremise, BusinessPremiseRequest, FursRequest, FursResponse, Invoice, InvoiceRequest,
    MessageHeader,
};
use crate::bundle::PemBundle;
use crate::config::{ClientConfig, FursEnv};
use crate::envelope::{self, TokenEnvelope};
use crate::error::{Error, Result};
use crate::identity::{Identity, Signer};
use crate::json::JsonCodec;
use crate::tls;
use crate::transport::{HttpsTransport, Transport};

/// Client for the FURS cash register API
///
/// Holds only immutable state, so a shared reference can be used from many
/// tasks at once.
pub struct FursClient<T = HttpsTransport> {
    env: FursEnv,
    identity: Identity,
    signer: Box<dyn Signer>,
    json: JsonCodec,
    transport: T,
}

impl FursClient<HttpsTransport> {
    /// Load the certificate bundle and set up mutual TLS
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let env = config.furs_env()?;
        let bundle = PemBundle::load(&config.bundle_path)?;
        let client = bundle.client_identity(env.client_cert_ou(), config.password.as_deref())?;

        let mut extra_roots = Vec::new();
        for path in &config.trust_roots {
            extra_roots.extend(tls::load_trust_roots(path)?);
        }
        let roots = tls::root_store(&bundle, &extra_roots)?;
        let http = tls::create_mtls_client(&client, roots, config.timeout())?;

        tracing::info!(
            echo = %env.echo_url(),
            subject = %client.identity.subject_name,
            "FURS client ready"
        );

        Ok(Self::new(
            env,
            client.identity,
            client.signer,
            config.json_codec(),
            HttpsTransport::new(http),
        ))
    }
}

impl<T: Transport> FursClient<T> {
    pub fn new(
        env: FursEnv,
        identity: Identity,
        signer: impl Signer + 'static,
        json: JsonCodec,
        transport: T,
    ) -> Self {
        Self {
            env,
            identity,
            signer: Box::new(signer),
            json,
            transport,
        }
    }

    pub fn env(&self) -> &FursEnv {
        &self.env
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Connectivity check; FURS echoes `message` back unsigned
    pub async fn echo(&self, message: &str) -> Result<String> {
        let request = FursRequest::Echo(message.to_string());
        let body = self.json.to_vec(&request)?;

        let response = self.exchange(self.env.echo_url(), body).await?;
        response.into_echo()
    }

    /// Register an invoice and return its EOR
    ///
    /// The protective mark is computed when the invoice has none.
    pub async fn invoice(&self, invoice: Invoice) -> Result<Uuid> {
        self.invoice_with_header(MessageHeader::now(), invoice).await
    }

    pub async fn invoice_with_header(&self, header: MessageHeader, mut invoice: Invoice) -> Result<Uuid> {
        invoice.validate()?;
        invoice.ensure_protected_id(self.signer.as_ref())?;

        let request = FursRequest::Invoice(InvoiceRequest { header, invoice });
        let response = self.signed_exchange(self.env.invoices_url(), &request).await?;

        let eor = response.into_unique_invoice_id()?;
        tracing::info!(eor = %eor, "invoice registered");
        Ok(eor)
    }

    /// Register, update or close a business premise
    pub async fn business_premise(&self, premise: BusinessPremise) -> Result<()> {
        self.business_premise_with_header(MessageHeader::now(), premise).await
    }

    pub async fn business_premise_with_header(
        &self,
        header: MessageHeader,
        premise: BusinessPremise,
    ) -> Result<()> {
        premise.validate()?;

        let premise_id = premise.business_premise_id.clone();
        let request = FursRequest::BusinessPremise(BusinessPremiseRequest {
            header,
            business_premise: premise,
        });
        let response = self
            .signed_exchange(self.env.business_premises_url(), &request)
            .await?;

        response.into_business_premise()?;
        tracing::info!(premise = %premise_id, "business premise registered");
        Ok(())
    }

    /// Protective mark of `invoice` under this client's key
    pub fn protected_id(&self, invoice: &Invoice) -> Result<String> {
        crate::api::protected_id(invoice, self.signer.as_ref())
    }

    async fn signed_exchange(&self, url: &url::Url, request: &FursRequest) -> Result<FursResponse> {
        if tracing::enabled!(tracing::Level::TRACE) {
            let payload = self.json.to_vec(request)?;
            tracing::trace!(payload = %String::from_utf8_lossy(&payload), "signing request");
        }

        let token = envelope::encode(&self.identity.header(), request, self.signer.as_ref(), &self.json)?;
        let body = self.json.to_vec(&TokenEnvelope::from(token))?;

        self.exchange(url, body).await
    }

    async fn exchange(&self, url: &url::Url, body: Vec<u8>) -> Result<FursResponse> {
        tracing::debug!(url = %url, bytes = body.len(), "FURS request");
        let reply = self.transport.send(url, body).await?;
        read_response(&reply, &self.json)
    }
}

/// Unwrap a reply body into a response record
///
/// A reply is either `{"token": ...}` or the response record itself. Signed
/// replies are decoded without checking the server's signature.
pub fn read_response(body: &[u8], json: &JsonCodec) -> Result<FursResponse> {
    let mut object: Map<String, Value> = json.from_slice(body)?;

    match object.remove("token") {
        Some(Value::String(token)) => {
            let response = envelope::decode(&token, json)?;
            tracing::trace!(response = ?response, "decoded signed reply");
            Ok(response)
        }
        Some(other) => Err(Error::MalformedToken(format!(
            "token must be a string, got {}",
            other
        ))),
        None => serde_json::from_value(Value::Object(object)).map_err(Error::Deserialization),
    }
}
