//! FURS request and response records
//!
//! Field names follow the FURS JSON schema (`PascalCase`, some acronyms
//! upper-cased), so every field carries an explicit rename.

mod invoice;
mod premise;

pub use invoice::{
    protected_id, zoi_input, FlatRateCompensation, Invoice, InvoiceIdentifier, InvoiceRequest,
    NumberingStructure, ReferenceInvoice, TaxesPerSeller, Vat,
};
pub use premise::{
    BpIdentifier, BusinessPremise, BusinessPremiseRequest, PremiseType, PropertyAddress,
    PropertyId, RealEstatePremise, SoftwareSupplier, CLOSING_TAG,
};

use chrono::{Local, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// `Header` block present in every signed request and response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    #[serde(rename = "MessageID")]
    pub message_id: Uuid,

    /// Local time, whole seconds
    #[serde(rename = "DateTime")]
    pub date_time: NaiveDateTime,
}

impl MessageHeader {
    /// Fresh random message id, stamped with the current local time
    pub fn now() -> Self {
        Self::at(Local::now().naive_local())
    }

    pub fn at(date_time: NaiveDateTime) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            date_time: whole_seconds(date_time),
        }
    }
}

/// FURS rejects fractional seconds in date-time fields
pub(crate) fn whole_seconds(date_time: NaiveDateTime) -> NaiveDateTime {
    date_time.with_nanosecond(0).unwrap_or(date_time)
}

/// Request envelope: exactly one operation per request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FursRequest {
    #[serde(rename = "EchoRequest")]
    Echo(String),

    #[serde(rename = "InvoiceRequest")]
    Invoice(InvoiceRequest),

    #[serde(rename = "BusinessPremiseRequest")]
    BusinessPremise(BusinessPremiseRequest),
}

/// Response envelope; every field may be missing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FursResponse {
    #[serde(rename = "EchoResponse", default, skip_serializing_if = "Option::is_none")]
    pub echo: Option<String>,

    #[serde(rename = "InvoiceResponse", default, skip_serializing_if = "Option::is_none")]
    pub invoice: Option<InvoiceResponse>,

    #[serde(
        rename = "BusinessPremiseResponse",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub business_premise: Option<BusinessPremiseResponse>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceResponse {
    #[serde(rename = "Header", default, skip_serializing_if = "Option::is_none")]
    pub header: Option<MessageHeader>,

    /// The EOR (unique invoice identifier) assigned by FURS
    #[serde(rename = "UniqueInvoiceID", default, skip_serializing_if = "Option::is_none")]
    pub unique_invoice_id: Option<String>,

    #[serde(rename = "Error", default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FursError>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusinessPremiseResponse {
    #[serde(rename = "Header", default, skip_serializing_if = "Option::is_none")]
    pub header: Option<MessageHeader>,

    #[serde(rename = "Error", default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FursError>,
}

/// Error object as returned by FURS
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FursError {
    #[serde(rename = "ErrorCode", default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(rename = "ErrorMessage", default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<FursError> for Error {
    fn from(err: FursError) -> Self {
        Error::Domain {
            code: err.code,
            message: err
                .message
                .unwrap_or_else(|| "FURS returned an error without a message".to_string()),
        }
    }
}

impl FursResponse {
    /// The echoed text
    pub fn into_echo(self) -> Result<String> {
        match self.echo {
            Some(text) if !text.is_empty() => Ok(text),
            _ => Err(Error::IncompleteResponse("missing EchoResponse".into())),
        }
    }

    /// The EOR of a registered invoice
    ///
    /// A present `UniqueInvoiceID` wins over an `Error` in the same response.
    pub fn into_unique_invoice_id(self) -> Result<Uuid> {
        let response = self
            .invoice
            .ok_or_else(|| Error::IncompleteResponse("missing InvoiceResponse".into()))?;

        match (response.unique_invoice_id, response.error) {
            (Some(eor), _) if !eor.is_empty() => Uuid::parse_str(&eor).map_err(|e| {
                Error::IncompleteResponse(format!("UniqueInvoiceID {:?} is not a UUID: {}", eor, e))
            }),
            (_, Some(error)) => Err(error.into()),
            _ => Err(Error::IncompleteResponse(
                "missing UniqueInvoiceID in InvoiceResponse".into(),
            )),
        }
    }

    /// Success means a `BusinessPremiseResponse` without an `Error`
    pub fn into_business_premise(self) -> Result<()> {
        match self.business_premise {
            Some(BusinessPremiseResponse {
                error: Some(error), ..
            }) => Err(error.into()),
            Some(_) => Ok(()),
            None => Err(Error::IncompleteResponse(
                "missing BusinessPremiseResponse".into(),
            )),
        }
    }
}
