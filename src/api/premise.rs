//! Business premise registration records

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::MessageHeader;
use crate::error::{Error, Result};
use crate::validation;

/// Value of `ClosingTag` that permanently closes a premise
pub const CLOSING_TAG: &str = "Z";

/// Body of a `BusinessPremiseRequest`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessPremiseRequest {
    #[serde(rename = "Header")]
    pub header: MessageHeader,

    #[serde(rename = "BusinessPremise")]
    pub business_premise: BusinessPremise,
}

/// Kind of premise that has no cadastral record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PremiseType {
    /// Vehicle or other movable object
    #[serde(rename = "A")]
    MobileObject,

    /// Fixed object at a non-registered location, e.g. a market stand
    #[serde(rename = "B")]
    FixedObject,

    /// A single electronic device used at varying locations
    #[serde(rename = "C")]
    IndividualDevice,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyId {
    #[serde(rename = "CadastralNumber")]
    pub cadastral_number: u16,

    #[serde(rename = "BuildingNumber")]
    pub building_number: u32,

    #[serde(rename = "BuildingSectionNumber")]
    pub building_section_number: u16,
}

impl PropertyId {
    pub fn validate(&self) -> Result<()> {
        range("cadastralNumber", self.cadastral_number.into(), 9999)?;
        range("buildingNumber", self.building_number, 99999)?;
        range("buildingSectionNumber", self.building_section_number.into(), 9999)
    }
}

fn range(field: &str, value: u32, max: u32) -> Result<()> {
    if value > max {
        return Err(Error::InvalidInput(format!(
            "{} must be between 0 and {}, but is {}",
            field, max, value
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyAddress {
    #[serde(rename = "Street")]
    pub street: String,

    #[serde(rename = "HouseNumber")]
    pub house_number: String,

    #[serde(rename = "HouseNumberAdditional", default, skip_serializing_if = "Option::is_none")]
    pub house_number_additional: Option<String>,

    #[serde(rename = "Community")]
    pub community: String,

    #[serde(rename = "City")]
    pub city: String,

    #[serde(rename = "PostalCode")]
    pub postal_code: String,
}

impl PropertyAddress {
    pub fn validate(&self) -> Result<()> {
        validation::text("street", &self.street, 1, 100)?;
        validation::text("houseNumber", &self.house_number, 1, 10)?;
        if let Some(additional) = &self.house_number_additional {
            validation::text("houseNumberAdditional", additional, 1, 10)?;
        }
        validation::text("community", &self.community, 1, 100)?;
        validation::text("city", &self.city, 1, 100)?;
        validation::text("postalCode", &self.postal_code, 4, 4)?;
        if !self.postal_code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidInput(format!(
                "postalCode must be 4 digits: {:?}",
                self.postal_code
            )));
        }
        Ok(())
    }
}

/// Premise registered in the real-estate cadastre
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealEstatePremise {
    #[serde(rename = "PropertyID")]
    pub property_id: PropertyId,

    #[serde(rename = "Address")]
    pub address: PropertyAddress,
}

/// Where the premise is: a cadastral property, or a movable premise type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BpIdentifier {
    #[serde(rename = "RealEstateBP")]
    RealEstate(RealEstatePremise),

    #[serde(rename = "PremiseType")]
    Movable(PremiseType),
}

/// Vendor of the cash register software
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareSupplier {
    /// Slovenian vendors
    #[serde(rename = "TaxNumber", default, skip_serializing_if = "Option::is_none")]
    pub tax_number: Option<u32>,

    /// Foreign vendors
    #[serde(rename = "NameForeign", default, skip_serializing_if = "Option::is_none")]
    pub name_foreign: Option<String>,
}

impl SoftwareSupplier {
    pub fn domestic(tax_number: u32) -> Self {
        Self {
            tax_number: Some(tax_number),
            name_foreign: None,
        }
    }

    pub fn foreign(name: impl Into<String>) -> Self {
        Self {
            tax_number: None,
            name_foreign: Some(name.into()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match (self.tax_number, &self.name_foreign) {
            (Some(tax_number), None) => validation::tax_number("taxNumber", tax_number).map(|_| ()),
            (None, Some(name)) => validation::text("nameForeign", name, 1, 1000),
            _ => Err(Error::InvalidInput(
                "software supplier needs exactly one of taxNumber and nameForeign".into(),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessPremise {
    #[serde(rename = "TaxNumber")]
    pub tax_number: u32,

    #[serde(rename = "BusinessPremiseID")]
    pub business_premise_id: String,

    #[serde(rename = "BPIdentifier")]
    pub identifier: BpIdentifier,

    #[serde(rename = "ValidityDate")]
    pub validity_date: NaiveDate,

    #[serde(rename = "ClosingTag", default, skip_serializing_if = "Option::is_none")]
    pub closing_tag: Option<String>,

    #[serde(rename = "SoftwareSupplier", default)]
    pub software_suppliers: Vec<SoftwareSupplier>,

    #[serde(rename = "SpecialNotes", default, skip_serializing_if = "Option::is_none")]
    pub special_notes: Option<String>,
}

impl BusinessPremise {
    pub fn new(
        tax_number: u32,
        business_premise_id: impl Into<String>,
        identifier: BpIdentifier,
        validity_date: NaiveDate,
    ) -> Self {
        Self {
            tax_number,
            business_premise_id: business_premise_id.into(),
            identifier,
            validity_date,
            closing_tag: None,
            software_suppliers: Vec::new(),
            special_notes: None,
        }
    }

    pub fn with_software_supplier(mut self, supplier: SoftwareSupplier) -> Self {
        self.software_suppliers.push(supplier);
        self
    }

    /// Mark the premise as closed. FURS does not allow reopening it.
    pub fn close_permanently(mut self) -> Self {
        self.closing_tag = Some(CLOSING_TAG.to_string());
        self
    }

    pub fn validate(&self) -> Result<()> {
        validation::tax_number("taxNumber", self.tax_number)?;
        validation::identifier("businessPremiseId", &self.business_premise_id)?;
        if let BpIdentifier::RealEstate(premise) = &self.identifier {
            premise.property_id.validate()?;
            premise.address.validate()?;
        }
        if self.software_suppliers.is_empty() {
            return Err(Error::InvalidInput(
                "at least one software supplier is required".into(),
            ));
        }
        for supplier in &self.software_suppliers {
            supplier.validate()?;
        }
        if let Some(notes) = &self.special_notes {
            validation::text("specialNotes", notes, 1, 1000)?;
        }
        Ok(())
    }
}
