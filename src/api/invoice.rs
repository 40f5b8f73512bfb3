//! Invoice registration records and the protective mark (ZOI)

use chrono::NaiveDateTime;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use super::{whole_seconds, MessageHeader};
use crate::error::{Error, Result};
use crate::identity::Signer;
use crate::validation::{self, Amount, TaxRate};

/// Body of an `InvoiceRequest`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRequest {
    #[serde(rename = "Header")]
    pub header: MessageHeader,

    #[serde(rename = "Invoice")]
    pub invoice: Invoice,
}

/// How invoice numbers are allocated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NumberingStructure {
    /// One sequence per business premise
    #[serde(rename = "C")]
    Centrally,

    /// One sequence per electronic device
    #[serde(rename = "B")]
    PerDevice,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceIdentifier {
    #[serde(rename = "BusinessPremiseID")]
    pub business_premise_id: String,

    #[serde(rename = "ElectronicDeviceID")]
    pub electronic_device_id: String,

    #[serde(rename = "InvoiceNumber")]
    pub invoice_number: String,
}

impl InvoiceIdentifier {
    pub fn new(
        business_premise_id: impl Into<String>,
        electronic_device_id: impl Into<String>,
        invoice_number: impl Into<String>,
    ) -> Self {
        Self {
            business_premise_id: business_premise_id.into(),
            electronic_device_id: electronic_device_id.into(),
            invoice_number: invoice_number.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validation::identifier("businessPremiseId", &self.business_premise_id)?;
        validation::identifier("electronicDeviceId", &self.electronic_device_id)?;
        validation::text("invoiceNumber", &self.invoice_number, 1, 20)?;
        if !self.invoice_number.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidInput(format!(
                "invoiceNumber must be numeric: {:?}",
                self.invoice_number
            )));
        }
        Ok(())
    }
}

/// One VAT rate with its base and tax
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vat {
    #[serde(rename = "TaxRate")]
    pub tax_rate: TaxRate,

    #[serde(rename = "TaxableAmount")]
    pub taxable_amount: Amount,

    #[serde(rename = "TaxAmount")]
    pub tax_amount: Amount,
}

impl Vat {
    pub fn new(tax_rate: TaxRate, taxable_amount: Amount, tax_amount: Amount) -> Self {
        Self {
            tax_rate,
            taxable_amount,
            tax_amount,
        }
    }
}

/// Flat-rate compensation for farmers and foresters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatRateCompensation {
    #[serde(rename = "FlatRateRate")]
    pub rate: TaxRate,

    #[serde(rename = "FlatRateTaxableAmount")]
    pub taxable_amount: Amount,

    #[serde(rename = "FlatRateAmount")]
    pub amount: Amount,
}

/// Taxes of a single seller on the invoice
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxesPerSeller {
    /// Only set when selling on behalf of someone else
    #[serde(rename = "SellerTaxNumber", default, skip_serializing_if = "Option::is_none")]
    pub seller_tax_number: Option<u32>,

    #[serde(rename = "VAT", default, skip_serializing_if = "Vec::is_empty")]
    pub vat: Vec<Vat>,

    #[serde(rename = "FlatRateCompensation", default, skip_serializing_if = "Vec::is_empty")]
    pub flat_rate_compensation: Vec<FlatRateCompensation>,

    #[serde(rename = "OtherTaxesAmount", default, skip_serializing_if = "Option::is_none")]
    pub other_taxes_amount: Option<Amount>,

    #[serde(rename = "ExemptVATTaxableAmount", default, skip_serializing_if = "Option::is_none")]
    pub exempt_vat_taxable_amount: Option<Amount>,

    #[serde(rename = "ReverseVATTaxableAmount", default, skip_serializing_if = "Option::is_none")]
    pub reverse_vat_taxable_amount: Option<Amount>,

    #[serde(rename = "NontaxableAmount", default, skip_serializing_if = "Option::is_none")]
    pub nontaxable_amount: Option<Amount>,

    #[serde(rename = "SpecialTaxRulesAmount", default, skip_serializing_if = "Option::is_none")]
    pub special_tax_rules_amount: Option<Amount>,
}

impl TaxesPerSeller {
    pub fn with_vat(mut self, vat: Vat) -> Self {
        self.vat.push(vat);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(tax_number) = self.seller_tax_number {
            validation::tax_number("sellerTaxNumber", tax_number)?;
        }
        Ok(())
    }
}

/// Earlier invoice this one corrects or refers to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceInvoice {
    #[serde(rename = "ReferenceInvoiceIdentifier")]
    pub identifier: InvoiceIdentifier,

    #[serde(rename = "ReferenceInvoiceIssueDateTime")]
    pub issue_date_time: NaiveDateTime,
}

/// An invoice issued through an electronic cash register
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    #[serde(rename = "TaxNumber")]
    pub tax_number: u32,

    #[serde(rename = "IssueDateTime")]
    pub issue_date_time: NaiveDateTime,

    #[serde(rename = "NumberingStructure")]
    pub numbering_structure: NumberingStructure,

    #[serde(rename = "InvoiceIdentifier")]
    pub identifier: InvoiceIdentifier,

    #[serde(rename = "CustomerVATNumber", default, skip_serializing_if = "Option::is_none")]
    pub customer_vat_number: Option<String>,

    #[serde(rename = "InvoiceAmount")]
    pub invoice_amount: Amount,

    #[serde(rename = "ReturnsAmount", default, skip_serializing_if = "Option::is_none")]
    pub returns_amount: Option<Amount>,

    #[serde(rename = "PaymentAmount")]
    pub payment_amount: Amount,

    #[serde(rename = "TaxesPerSeller", default, skip_serializing_if = "Vec::is_empty")]
    pub taxes_per_seller: Vec<TaxesPerSeller>,

    #[serde(rename = "OperatorTaxNumber", default, skip_serializing_if = "Option::is_none")]
    pub operator_tax_number: Option<u32>,

    #[serde(rename = "ForeignOperator", default, skip_serializing_if = "Option::is_none")]
    pub foreign_operator: Option<bool>,

    /// Filled in by the client when left empty
    #[serde(rename = "ProtectedID", default, skip_serializing_if = "Option::is_none")]
    pub protected_id: Option<String>,

    #[serde(rename = "SubsequentSubmit", default, skip_serializing_if = "Option::is_none")]
    pub subsequent_submit: Option<bool>,

    #[serde(rename = "ReferenceInvoice", default, skip_serializing_if = "Vec::is_empty")]
    pub reference_invoices: Vec<ReferenceInvoice>,
}

impl Invoice {
    /// Invoice numbered per premise, paid in full, with no taxes listed yet
    pub fn new(
        tax_number: u32,
        issue_date_time: NaiveDateTime,
        identifier: InvoiceIdentifier,
        invoice_amount: Amount,
    ) -> Self {
        Self {
            tax_number,
            issue_date_time: whole_seconds(issue_date_time),
            numbering_structure: NumberingStructure::Centrally,
            identifier,
            customer_vat_number: None,
            invoice_amount,
            returns_amount: None,
            payment_amount: invoice_amount,
            taxes_per_seller: Vec::new(),
            operator_tax_number: None,
            foreign_operator: None,
            protected_id: None,
            subsequent_submit: None,
            reference_invoices: Vec::new(),
        }
    }

    pub fn with_taxes(mut self, taxes: TaxesPerSeller) -> Self {
        self.taxes_per_seller.push(taxes);
        self
    }

    pub fn with_operator_tax_number(mut self, tax_number: u32) -> Self {
        self.operator_tax_number = Some(tax_number);
        self
    }

    pub fn validate(&self) -> Result<()> {
        validation::tax_number("taxNumber", self.tax_number)?;
        self.identifier.validate()?;
        if let Some(vat_number) = &self.customer_vat_number {
            validation::text("customerVatNumber", vat_number, 1, 20)?;
        }
        if let Some(tax_number) = self.operator_tax_number {
            validation::tax_number("operatorTaxNumber", tax_number)?;
        }
        if let Some(zoi) = &self.protected_id {
            validation::protected_id(zoi)?;
        }
        for taxes in &self.taxes_per_seller {
            taxes.validate()?;
        }
        for reference in &self.reference_invoices {
            reference.identifier.validate()?;
        }
        Ok(())
    }

    /// Compute and store the protective mark if none is set yet
    pub fn ensure_protected_id(&mut self, signer: &dyn Signer) -> Result<&str> {
        let zoi = match self.protected_id.take() {
            Some(zoi) => zoi,
            None => protected_id(self, signer)?,
        };
        let zoi: &str = self.protected_id.insert(zoi);
        Ok(zoi)
    }
}

/// The string the protective mark is computed over
pub fn zoi_input(invoice: &Invoice) -> String {
    let id = &invoice.identifier;
    format!(
        "{}{}{}{}{}{}",
        invoice.tax_number,
        invoice.issue_date_time.format("%Y-%m-%d %H:%M:%S"),
        id.invoice_number,
        id.business_premise_id,
        id.electronic_device_id,
        invoice.invoice_amount,
    )
}

/// Protective mark (ZOI): hex MD5 of the RS256 signature over [`zoi_input`]
pub fn protected_id(invoice: &Invoice, signer: &dyn Signer) -> Result<String> {
    let signature = signer.sign(zoi_input(invoice).as_bytes())?;
    Ok(hex::encode(Md5::digest(&signature)))
}
