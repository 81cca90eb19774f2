use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::capabilities::{Prompt, Question, ServiceField};

const TOKENS_PER_COIN: u64 = 100_000_000;

/// Arguments collected for a service request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfirmation {
    pub arguments: Map<String, Value>,
}

/// Asks for a value for every field the service declares.
///
/// Text answers longer than a field's limit are cut to the limit. A service
/// without fields is confirmed with empty arguments and no prompt.
pub async fn confirm_service_use(
    ask: &dyn Prompt,
    description: Option<&str>,
    fields: &[ServiceField],
) -> ServiceConfirmation {
    if fields.is_empty() {
        return ServiceConfirmation::default();
    }

    let questions = fields
        .iter()
        .map(|field| {
            let question = Question::input(&field.name, &field.description, field.limit);
            match description {
                Some(description) => question.with_prefix(format!("[{description}]")),
                None => question,
            }
        })
        .collect();

    let mut answers = ask.ask(questions).await;

    let arguments = fields
        .iter()
        .filter_map(|field| {
            let value = answers.remove(&field.name)?;
            Some((field.name.clone(), clamp_to_limit(value, field.limit)))
        })
        .collect::<Map<_, _>>();

    debug!(answered = arguments.len(), fields = fields.len(), "Collected service arguments");
    ServiceConfirmation { arguments }
}

fn clamp_to_limit(value: Value, limit: Option<usize>) -> Value {
    match (value, limit) {
        (Value::String(text), Some(limit)) if text.chars().count() > limit => {
            Value::String(text.chars().take(limit).collect())
        }
        (value, _) => value,
    }
}

/// Renders an amount of base units as a whole-coin amount with eight decimals.
pub fn format_tokens(tokens: u64) -> String {
    format!(
        "{}.{:08}",
        tokens / TOKENS_PER_COIN,
        tokens % TOKENS_PER_COIN
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::capabilities::{Answers, QuestionKind};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    struct Recorded {
        answers: Answers,
        asked: Mutex<Vec<Question>>,
    }

    #[async_trait]
    impl Prompt for Recorded {
        async fn ask(&self, questions: Vec<Question>) -> Answers {
            self.asked.lock().extend(questions);
            self.answers.clone()
        }
    }

    fn field(name: &str, limit: Option<usize>) -> ServiceField {
        ServiceField {
            name: name.to_string(),
            description: format!("Enter {name}"),
            limit,
        }
    }

    #[test]
    fn formats_tokens_as_coins() {
        assert_eq!(format_tokens(1000), "0.00001000");
        assert_eq!(format_tokens(0), "0.00000000");
        assert_eq!(format_tokens(250_000_001), "2.50000001");
    }

    #[tokio::test]
    async fn no_fields_means_no_prompt() {
        let prompt = Recorded {
            answers: Answers::new(),
            asked: Mutex::new(Vec::new()),
        };
        let confirmation = confirm_service_use(&prompt, Some("d"), &[]).await;
        assert!(confirmation.arguments.is_empty());
        assert!(prompt.asked.lock().is_empty());
    }

    #[tokio::test]
    async fn collects_and_clamps_answers() {
        let mut answers = Answers::new();
        answers.insert("query".into(), json!("lightning network"));
        answers.insert("unrelated".into(), json!(true));
        let prompt = Recorded {
            answers,
            asked: Mutex::new(Vec::new()),
        };

        let confirmation = confirm_service_use(
            &prompt,
            Some("Search"),
            &[field("query", Some(9)), field("page", None)],
        )
        .await;

        assert_eq!(confirmation.arguments.len(), 1);
        assert_eq!(confirmation.arguments["query"], json!("lightning"));

        let asked = prompt.asked.lock();
        assert_eq!(asked.len(), 2);
        assert_eq!(asked[0].prefix.as_deref(), Some("[Search]"));
        assert_eq!(asked[0].kind, QuestionKind::Input { max_length: Some(9) });
    }
}
