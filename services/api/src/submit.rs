use crate::infra::{mitigation_settings, ConfiguredFlagStore, InMemorySubmissionLedger};
use clap::Args;
use lead_intake::config::AppConfig;
use lead_intake::error::AppError;
use lead_intake::telemetry;
use lead_intake::workflows::leads::{
    ClientTokenProvider, ConsentState, FormCatalog, FormSession, HttpRelay,
    LeadSubmissionService, SubmissionError, SubmissionResult, TracingNotificationSink,
};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct SubmitArgs {
    /// Form to submit (see `forms` for the available ids)
    #[arg(long)]
    pub(crate) form: String,
    /// Field value as name=value; repeat for each field
    #[arg(long = "field", value_parser = parse_field)]
    pub(crate) fields: Vec<(String, String)>,
    /// Record that the submitter agreed to be contacted
    #[arg(long)]
    pub(crate) consent: bool,
    /// Bot-mitigation token obtained out of band
    #[arg(long)]
    pub(crate) token: Option<String>,
    /// Device identifier for one-time prompt flags
    #[arg(long)]
    pub(crate) device_id: Option<String>,
}

pub(crate) fn parse_field(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("field name missing in '{raw}'"));
    }
    Ok((name.to_string(), value.to_string()))
}

pub(crate) fn print_forms() -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let catalog = FormCatalog::standard(&config.leads);

    match serde_json::to_string_pretty(&catalog.views()) {
        Ok(json) => println!("{json}"),
        Err(err) => println!("Form schemas unavailable: {err}"),
    }
    Ok(())
}

pub(crate) async fn run_submit(args: SubmitArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;
    let leads = &config.leads;

    let service = LeadSubmissionService::new(
        Arc::new(FormCatalog::standard(leads)),
        Arc::new(HttpRelay::new(leads.relay_timeout)?),
        Arc::new(ConfiguredFlagStore::from_config(leads)?),
        Arc::new(InMemorySubmissionLedger::default()),
        Arc::new(TracingNotificationSink),
        mitigation_settings(leads),
    );

    let form = service
        .form(&args.form)
        .ok_or_else(|| AppError::UnknownForm(args.form.clone()))?;

    let input: BTreeMap<String, String> = args.fields.into_iter().collect();
    if let Some(unknown) = input
        .keys()
        .find(|name| !form.schema.fields.iter().any(|spec| &spec.name == *name))
    {
        return Err(AppError::InvalidInput(format!(
            "form '{}' has no field '{unknown}'",
            form.id
        )));
    }

    let mut session = FormSession::with_input(
        form.id.clone(),
        &form.schema,
        &input,
        ConsentState::from(args.consent),
    );
    let provider = ClientTokenProvider::new(args.token);
    let result = service
        .run_submission(form, &mut session, &provider, args.device_id.as_deref())
        .await;

    println!("Form: {} ({})", form.id, form.source);
    match &result {
        SubmissionResult::Success => {
            println!("Result: {}", result.label());
            println!("  {}: {}", form.success.title, form.success.description);
        }
        SubmissionResult::Failure(reason) => {
            println!("Result: {} ({reason})", result.label());
            if let Some(SubmissionError::Validation(report)) = session.last_error() {
                for error in report.errors() {
                    println!("  - {error}");
                }
            }
        }
        other => println!("Result: {}", other.label()),
    }
    exit_status(&result)
}

/// A failed submission surfaces as an error so scripts see a non-zero exit.
fn exit_status(result: &SubmissionResult) -> Result<(), AppError> {
    match result {
        SubmissionResult::Failure(reason) => Err(AppError::SubmissionFailed(reason.clone())),
        _ => Ok(()),
    }
}
