use std::collections::BTreeMap;

use serde::Serialize;

use super::domain::{FieldRule, FieldSpec, FormId, FormSchema};
use super::notify::Notification;
use super::relay::{PayloadEncoding, RelayEndpoint, RelayEnvelope};
use crate::config::LeadConfig;

pub const CONTACT_FORM: &str = "contact";
pub const CONSULTATION_FORM: &str = "consultation";
pub const NEWSLETTER_FORM: &str = "newsletter";
pub const NEWSLETTER_POPUP_FORM: &str = "newsletter_popup";

/// Flag written once a device has subscribed through, or dismissed, the popup.
pub const SEEN_EMAIL_POPUP_FLAG: &str = "has_seen_email_popup";

const INTEREST_OPTIONS: [&str; 5] = [
    "Property in Dubai",
    "Property in Ras Al Khaimah",
    "Company Setup",
    "Legal Services",
    "General Information",
];

const NEWSLETTER_CONFIRMATION_SUBJECT: &str = "Welcome to our newsletter";
const NEWSLETTER_CONFIRMATION_BODY: &str = "Thank you for subscribing to our newsletter. \
You'll now receive the latest updates on the real estate market and investment opportunities.";

/// Acknowledgement mailed to the submitter after the primary delivery lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationTemplate {
    pub endpoint: RelayEndpoint,
    /// Form field holding the submitter's address.
    pub address_field: String,
    pub subject: String,
    pub body: String,
}

/// Everything the submission flow needs to know about one form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormDefinition {
    pub id: FormId,
    pub source: String,
    pub schema: FormSchema,
    pub endpoint: RelayEndpoint,
    pub recipient: String,
    pub mitigation_action: String,
    pub confirmation: Option<ConfirmationTemplate>,
    pub one_time_flag: Option<String>,
    pub success: Notification,
}

impl FormDefinition {
    pub fn view(&self) -> FormView {
        FormView {
            id: self.id.clone(),
            source: self.source.clone(),
            fields: self.schema.fields.clone(),
            encoding: self.endpoint.encoding,
            requires_mitigation: self.endpoint.requires_mitigation(),
            mitigation_action: self
                .endpoint
                .requires_mitigation()
                .then(|| self.mitigation_action.clone()),
            one_time_prompt: self.one_time_flag.is_some(),
        }
    }
}

/// Public description of a form for front-end rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormView {
    pub id: FormId,
    pub source: String,
    pub fields: Vec<FieldSpec>,
    pub encoding: PayloadEncoding,
    pub requires_mitigation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mitigation_action: Option<String>,
    pub one_time_prompt: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FormCatalog {
    forms: BTreeMap<FormId, FormDefinition>,
}

impl FormCatalog {
    pub fn new(forms: impl IntoIterator<Item = FormDefinition>) -> Self {
        Self {
            forms: forms
                .into_iter()
                .map(|form| (form.id.clone(), form))
                .collect(),
        }
    }

    /// The brokerage site's lead capture points wired to the configured relays.
    pub fn standard(config: &LeadConfig) -> Self {
        Self::new([
            contact_form(config),
            consultation_form(config),
            newsletter_form(config, NEWSLETTER_FORM, "newsletter_section", None),
            newsletter_form(
                config,
                NEWSLETTER_POPUP_FORM,
                "newsletter_popup",
                Some(SEEN_EMAIL_POPUP_FLAG),
            ),
        ])
    }

    pub fn get(&self, id: &str) -> Option<&FormDefinition> {
        self.forms.get(&FormId(id.to_string()))
    }

    pub fn forms(&self) -> impl Iterator<Item = &FormDefinition> {
        self.forms.values()
    }

    pub fn views(&self) -> Vec<FormView> {
        self.forms.values().map(FormDefinition::view).collect()
    }
}

fn contact_form(config: &LeadConfig) -> FormDefinition {
    let endpoint = RelayEndpoint::new(
        "contact-relay",
        config.contact_relay_url.clone(),
        PayloadEncoding::Json,
    )
    .with_envelope(RelayEnvelope::Web3Forms {
        access_key: config.contact_access_key.clone(),
    })
    .requiring_mitigation()
    .with_recipient_field("to_email")
    .with_source_field("source");

    FormDefinition {
        id: FormId(CONTACT_FORM.to_string()),
        source: "contact_form".to_string(),
        schema: FormSchema::new(vec![
            FieldSpec::required("name", "Name").with_rule(FieldRule::MaxLength { limit: 120 }),
            FieldSpec::required("email", "Email").with_rule(FieldRule::Email),
            FieldSpec::required("message", "Message")
                .with_rule(FieldRule::MaxLength { limit: 5_000 }),
        ]),
        endpoint,
        recipient: config.target_email.clone(),
        mitigation_action: "contact_submit".to_string(),
        confirmation: None,
        one_time_flag: None,
        success: Notification::success(
            "Thank You!",
            "Your message has been sent successfully!",
        ),
    }
}

fn consultation_form(config: &LeadConfig) -> FormDefinition {
    let endpoint = RelayEndpoint::new(
        "consultation-relay",
        config.consultation_relay_url.clone(),
        PayloadEncoding::FormUrlEncoded,
    )
    .with_source_field("Source")
    .map_field("title", "Title")
    .map_field("first_name", "First Name")
    .map_field("last_name", "Last Name")
    .map_field("email", "Email")
    .map_field("phone", "Phone")
    .map_field("interested_in", "Interested In")
    .map_field("message", "Message");

    FormDefinition {
        id: FormId(CONSULTATION_FORM.to_string()),
        source: "consultation_form".to_string(),
        schema: FormSchema::new(vec![
            FieldSpec::optional("title", "Title").with_rule(FieldRule::OneOf {
                values: ["Mr.", "Mrs.", "Ms.", "Dr."].map(String::from).to_vec(),
            }),
            FieldSpec::required("first_name", "First Name")
                .with_rule(FieldRule::MaxLength { limit: 80 }),
            FieldSpec::required("last_name", "Last Name")
                .with_rule(FieldRule::MaxLength { limit: 80 }),
            FieldSpec::required("email", "Email").with_rule(FieldRule::Email),
            FieldSpec::optional("phone", "Phone Number").with_rule(FieldRule::Phone),
            FieldSpec::required("interested_in", "Interested In").with_rule(FieldRule::OneOf {
                values: INTEREST_OPTIONS.map(String::from).to_vec(),
            }),
            FieldSpec::optional("message", "Message")
                .with_rule(FieldRule::MaxLength { limit: 5_000 }),
        ]),
        endpoint,
        recipient: config.target_email.clone(),
        mitigation_action: "consultation_submit".to_string(),
        confirmation: None,
        one_time_flag: None,
        success: Notification::success(
            "Thank You!",
            "Your consultation request has been submitted. We'll contact you shortly.",
        ),
    }
}

fn newsletter_form(
    config: &LeadConfig,
    id: &str,
    source: &str,
    one_time_flag: Option<&str>,
) -> FormDefinition {
    let emailjs = &config.emailjs;
    let endpoint = RelayEndpoint::new(
        "newsletter-relay",
        emailjs.url.clone(),
        PayloadEncoding::Json,
    )
    .with_envelope(RelayEnvelope::EmailJs {
        service_id: emailjs.service_id.clone(),
        template_id: emailjs.newsletter_template.clone(),
        public_key: emailjs.public_key.clone(),
    })
    .with_recipient_field("to_email")
    .with_source_field("source")
    .map_field("email", "from_email");

    let confirmation = ConfirmationTemplate {
        endpoint: RelayEndpoint::new(
            "newsletter-confirmation",
            emailjs.url.clone(),
            PayloadEncoding::Json,
        )
        .with_envelope(RelayEnvelope::EmailJs {
            service_id: emailjs.service_id.clone(),
            template_id: emailjs.confirmation_template.clone(),
            public_key: emailjs.public_key.clone(),
        })
        .with_recipient_field("to_email")
        .with_source_field("source"),
        address_field: "email".to_string(),
        subject: NEWSLETTER_CONFIRMATION_SUBJECT.to_string(),
        body: NEWSLETTER_CONFIRMATION_BODY.to_string(),
    };

    FormDefinition {
        id: FormId(id.to_string()),
        source: source.to_string(),
        schema: FormSchema::new(vec![
            FieldSpec::required("email", "Email address").with_rule(FieldRule::Email)
        ]),
        endpoint,
        recipient: config.target_email.clone(),
        mitigation_action: "newsletter_subscribe".to_string(),
        confirmation: Some(confirmation),
        one_time_flag: one_time_flag.map(str::to_string),
        success: Notification::success(
            "Subscribed!",
            "Thank you for subscribing. Check your inbox for a confirmation email.",
        ),
    }
}
