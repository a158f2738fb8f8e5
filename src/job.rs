//! Job payload view used for matching.
//!
//! Rules match against a job's *display class*. Jobs enqueued through an
//! adapter wrapper expose the wrapped class instead of the wrapper, and mailer
//! deliveries expose `Mailer#method`.

use serde_json::Value;

const ACTIVE_JOB_WRAPPERS: [&str; 2] = [
    "ActiveJob::QueueAdapters::SidekiqAdapter::JobWrapper",
    "Sidekiq::ActiveJob::Wrapper",
];

const MAILER_DELIVERY_JOBS: [&str; 2] = ["ActionMailer::DeliveryJob", "ActionMailer::MailDeliveryJob"];

/// Read-only wrapper around a raw JSON job payload.
#[derive(Clone, Debug, PartialEq)]
pub struct JobRecord {
    payload: Value,
}

impl JobRecord {
    pub fn new(payload: Value) -> Self {
        Self { payload }
    }

    /// Parses a serialized payload.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw).map(Self::new)
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// The `class` field, empty when absent.
    pub fn class(&self) -> &str {
        self.payload.get("class").and_then(Value::as_str).unwrap_or("")
    }

    /// Identifier patterns are matched against.
    pub fn display_class(&self) -> String {
        if let Some(explicit) = self.payload.get("display_class").and_then(Value::as_str) {
            return explicit.to_string();
        }

        let class = self.class();
        if !ACTIVE_JOB_WRAPPERS.contains(&class) {
            return class.to_string();
        }

        let first_arg = self.payload.get("args").and_then(|args| args.get(0));
        let wrapped = self
            .payload
            .get("wrapped")
            .and_then(Value::as_str)
            .or_else(|| first_arg.and_then(|a| a.get("job_class")).and_then(Value::as_str));

        match wrapped {
            Some(job_class) if MAILER_DELIVERY_JOBS.contains(&job_class) => first_arg
                .and_then(mailer_target)
                .unwrap_or_else(|| job_class.to_string()),
            Some(job_class) => job_class.to_string(),
            None => class.to_string(),
        }
    }
}

/// `Mailer#method` from the first two delivery arguments.
fn mailer_target(job: &Value) -> Option<String> {
    let arguments = job.get("arguments")?.as_array()?;
    let parts: Vec<&str> = arguments.iter().take(2).filter_map(Value::as_str).collect();
    (!parts.is_empty()).then(|| parts.join("#"))
}

impl From<Value> for JobRecord {
    fn from(payload: Value) -> Self {
        Self::new(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_class() {
        let job = JobRecord::new(json!({"class": "Billing::ChargeJob", "jid": "x1", "args": [1]}));
        assert_eq!(job.display_class(), "Billing::ChargeJob");
        assert_eq!(job.class(), "Billing::ChargeJob");
    }

    #[test]
    fn test_explicit_display_class_wins() {
        let job = JobRecord::new(json!({"class": "Wrapper", "display_class": "Inner"}));
        assert_eq!(job.display_class(), "Inner");
    }

    #[test]
    fn test_active_job_wrapper() {
        let job = JobRecord::new(json!({
            "class": "Sidekiq::ActiveJob::Wrapper",
            "wrapped": "ReportJob",
            "args": [{"job_class": "ReportJob", "arguments": []}]
        }));
        assert_eq!(job.display_class(), "ReportJob");

        let job = JobRecord::new(json!({
            "class": "ActiveJob::QueueAdapters::SidekiqAdapter::JobWrapper",
            "args": [{"job_class": "ReportJob"}]
        }));
        assert_eq!(job.display_class(), "ReportJob");
    }

    #[test]
    fn test_mailer_delivery() {
        let job = JobRecord::new(json!({
            "class": "Sidekiq::ActiveJob::Wrapper",
            "wrapped": "ActionMailer::MailDeliveryJob",
            "args": [{
                "job_class": "ActionMailer::MailDeliveryJob",
                "arguments": ["OnboardingMailer", "welcome", "deliver_now"]
            }]
        }));
        assert_eq!(job.display_class(), "OnboardingMailer#welcome");
    }

    #[test]
    fn test_missing_class() {
        let job = JobRecord::parse(r#"{"args": []}"#).unwrap();
        assert_eq!(job.display_class(), "");
    }
}
