//! Register a premise and one invoice against the FURS test environment
//!
//! ```text
//! FURS_BUNDLE=bundle.pem FURS_PASSWORD=... FURS_TAX_NUMBER=12345678 \
//!     cargo run --example send_invoice
//! ```

use chrono::Local;
use furs::api::{BpIdentifier, PremiseType, SoftwareSupplier};
use furs::{
    BusinessPremise, ClientConfig, FursClient, Invoice, InvoiceIdentifier, TaxesPerSeller, Vat,
};
use tracing_subscriber::EnvFilter;

const PREMISE_ID: &str = "DEMO1";
const DEVICE_ID: &str = "BLAG1";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("furs=info")))
        .init();

    let tax_number = furs::validation::parse_tax_number(
        "FURS_TAX_NUMBER",
        &std::env::var("FURS_TAX_NUMBER").map_err(|_| "FURS_TAX_NUMBER not set")?,
    )?;

    let client = FursClient::from_config(&ClientConfig::from_env()?)?;

    // Step 1: the premise must be registered before invoices can reference it
    println!("Step 1: Registering business premise {}...", PREMISE_ID);
    let premise = BusinessPremise::new(
        tax_number,
        PREMISE_ID,
        BpIdentifier::Movable(PremiseType::IndividualDevice),
        Local::now().date_naive(),
    )
    .with_software_supplier(SoftwareSupplier::foreign("furs-rs demo"));
    client.business_premise(premise).await?;
    println!("   ✓ Premise registered");

    // Step 2: one invoice of 12.20 EUR with 22% VAT
    println!("\nStep 2: Registering invoice...");
    let vat = Vat::new("22.00".parse()?, "10.00".parse()?, "2.20".parse()?);
    let mut invoice = Invoice::new(
        tax_number,
        Local::now().naive_local(),
        InvoiceIdentifier::new(PREMISE_ID, DEVICE_ID, "1"),
        "12.20".parse()?,
    )
    .with_taxes(TaxesPerSeller::default().with_vat(vat));
    invoice.operator_tax_number = Some(tax_number);

    let zoi = client.protected_id(&invoice)?;
    invoice.protected_id = Some(zoi.clone());
    println!("   → ZOI: {}", zoi);

    let eor = client.invoice(invoice).await?;
    println!("   ✓ EOR: {}", eor);

    Ok(())
}
