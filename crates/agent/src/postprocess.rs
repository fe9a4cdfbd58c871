//! Response post-processing: intent classification, action-card extraction,
//! structured-advice parsing and localized fallbacks.
//!
//! Nothing here returns an error. Parse failures are logged and degrade to a
//! safe default.

use finmentor_core::locale::Locale;
use finmentor_core::message::Metadata;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

const CARD_OPEN: &str = "[ACTION_CARD]";
const CARD_CLOSE: &str = "[/ACTION_CARD]";

/// What kind of answer a question needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    /// Definitional / how-to question, answerable once for everyone
    GeneralFaq,
    /// Anything user-specific; never cached
    PersonalizedAdvice,
}

impl Intent {
    pub fn is_cacheable(&self) -> bool {
        matches!(self, Self::GeneralFaq)
    }
}

fn faq_keywords(locale: Locale) -> &'static [&'static str] {
    match locale {
        Locale::Vi => &["là gì", "định nghĩa", "cách làm", "tại sao", "nghĩa là"],
        Locale::En => &["what is", "what are", "how to", "definition", "define", "meaning of"],
        Locale::Zh => &["是什么", "什么是", "定义", "如何", "怎么", "为什么"],
    }
}

/// Route a question by keyword. The request locale's keywords are tried
/// first, then the other locales'.
pub fn classify_intent(text: &str, locale: Locale) -> Intent {
    let lowered = text.trim().to_lowercase();
    if lowered.is_empty() {
        return Intent::PersonalizedAdvice;
    }

    let others = Locale::ALL.into_iter().filter(|l| *l != locale);
    for candidate in std::iter::once(locale).chain(others) {
        if let Some(keyword) = faq_keywords(candidate).iter().find(|k| lowered.contains(*k)) {
            debug!(locale = %candidate, keyword, "Classified as general FAQ");
            return Intent::GeneralFaq;
        }
    }
    Intent::PersonalizedAdvice
}

/// Display text plus the metadata extracted from it.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedReply {
    pub text: String,
    pub metadata: Metadata,
}

/// Strip the first `[ACTION_CARD]...[/ACTION_CARD]` block and parse it.
///
/// A JSON object inside the markers becomes the metadata plus
/// `hasActionCard: true`. Anything else (no block, malformed JSON, a
/// non-object) gives `{type: "TEXT"}`. The block is removed from the text
/// whenever both markers are present.
pub fn extract_action_card(raw: &str) -> ProcessedReply {
    let Some((before, inner, after)) = split_card(raw) else {
        return ProcessedReply {
            text: raw.trim().to_string(),
            metadata: text_metadata(),
        };
    };

    let text = format!("{before}{after}").trim().to_string();
    let metadata = match serde_json::from_str::<Value>(inner.trim()) {
        Ok(Value::Object(mut card)) => {
            card.insert("hasActionCard".into(), Value::Bool(true));
            card
        }
        Ok(_) => {
            warn!(len = inner.len(), "Action card is not a JSON object");
            text_metadata()
        }
        Err(e) => {
            warn!(len = inner.len(), error = %e, "Failed to parse action card");
            text_metadata()
        }
    };

    ProcessedReply { text, metadata }
}

fn split_card(raw: &str) -> Option<(&str, &str, &str)> {
    let start = raw.find(CARD_OPEN)?;
    let body_start = start + CARD_OPEN.len();
    let body_len = raw[body_start..].find(CARD_CLOSE)?;
    let body_end = body_start + body_len;
    Some((
        &raw[..start],
        &raw[body_start..body_end],
        &raw[body_end + CARD_CLOSE.len()..],
    ))
}

fn text_metadata() -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("type".into(), Value::String("TEXT".into()));
    metadata
}

/// Structured nudge returned by the advice operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseAdvice {
    pub nudge: String,
    pub trigger: String,
    #[serde(rename = "nextStep", default, skip_serializing_if = "Option::is_none")]
    pub next_step: Option<String>,
}

/// Parse fenced JSON advice. Returns the advice and whether it was parsed
/// (`false` means the localized fallback was used).
///
/// `nudge` and `trigger` must be non-empty strings. A missing `nextStep`
/// takes `default_next_step`.
pub fn parse_structured_advice(
    raw: &str,
    locale: Locale,
    default_next_step: Option<&str>,
) -> (CourseAdvice, bool) {
    let cleaned = strip_fences(raw);
    match serde_json::from_str::<CourseAdvice>(&cleaned) {
        Ok(mut advice) if !advice.nudge.trim().is_empty() && !advice.trigger.trim().is_empty() => {
            if advice.next_step.is_none() {
                advice.next_step = default_next_step.map(str::to_string);
            }
            (advice, true)
        }
        Ok(_) => {
            warn!("Structured advice is missing nudge or trigger");
            (fallback_advice(locale, default_next_step), false)
        }
        Err(e) => {
            warn!(len = raw.len(), error = %e, "Failed to parse structured advice");
            (fallback_advice(locale, default_next_step), false)
        }
    }
}

fn strip_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```", "").trim().to_string()
}

/// Fixed advice used when the provider output is unusable.
pub fn fallback_advice(locale: Locale, next_step: Option<&str>) -> CourseAdvice {
    let (nudge, trigger) = match locale {
        Locale::Vi => (
            "Tiếp tục hành trình chinh phục tài chính của bạn!",
            "Bắt đầu bài học tiếp theo ngay",
        ),
        Locale::En => (
            "Keep going on your journey to financial mastery!",
            "Start your next lesson now",
        ),
        Locale::Zh => ("继续你的财务成长之旅！", "立即开始下一课"),
    };
    CourseAdvice {
        nudge: nudge.into(),
        trigger: trigger.into(),
        next_step: next_step.map(str::to_string),
    }
}

/// Chat reply used for degraded turns.
pub fn fallback_reply(locale: Locale) -> &'static str {
    match locale {
        Locale::Vi => "Xin lỗi, trợ lý AI đang tạm thời gián đoạn. Vui lòng thử lại sau ít phút.",
        Locale::En => "Sorry, the AI mentor is temporarily unavailable. Please try again in a few minutes.",
        Locale::Zh => "抱歉，AI 导师暂时无法使用，请稍后再试。",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn definitional_questions_are_faq() {
        assert_eq!(classify_intent("What is compound interest?", Locale::En), Intent::GeneralFaq);
        assert_eq!(classify_intent("  HOW TO budget  ", Locale::En), Intent::GeneralFaq);
        assert_eq!(classify_intent("Lãi kép là gì?", Locale::Vi), Intent::GeneralFaq);
        assert_eq!(classify_intent("复利是什么", Locale::Zh), Intent::GeneralFaq);
    }

    #[test]
    fn other_locale_keywords_still_match() {
        assert_eq!(classify_intent("what is an ETF", Locale::Vi), Intent::GeneralFaq);
    }

    #[test]
    fn personal_and_empty_questions_are_personalized() {
        assert_eq!(
            classify_intent("Should I sell my stocks today?", Locale::En),
            Intent::PersonalizedAdvice
        );
        assert_eq!(classify_intent("", Locale::En), Intent::PersonalizedAdvice);
        assert_eq!(classify_intent("   ", Locale::Vi), Intent::PersonalizedAdvice);
        assert!(!Intent::PersonalizedAdvice.is_cacheable());
    }

    #[test]
    fn action_card_is_stripped_and_parsed() {
        let reply = extract_action_card("Hi [ACTION_CARD]{\"type\":\"LINK\"}[/ACTION_CARD] bye");
        assert_eq!(reply.text, "Hi  bye");
        assert_eq!(
            Value::Object(reply.metadata),
            json!({"type": "LINK", "hasActionCard": true})
        );
    }

    #[test]
    fn malformed_card_degrades_to_text() {
        let reply = extract_action_card("Read this [ACTION_CARD]{type: LINK[/ACTION_CARD]");
        assert_eq!(reply.text, "Read this");
        assert_eq!(Value::Object(reply.metadata), json!({"type": "TEXT"}));

        let reply = extract_action_card("x [ACTION_CARD][1,2][/ACTION_CARD]");
        assert_eq!(Value::Object(reply.metadata), json!({"type": "TEXT"}));
    }

    #[test]
    fn only_first_card_is_extracted() {
        let raw = "a [ACTION_CARD]{\"type\":\"QUIZ\"}[/ACTION_CARD] b [ACTION_CARD]{\"type\":\"LINK\"}[/ACTION_CARD]";
        let reply = extract_action_card(raw);
        assert_eq!(reply.metadata["type"], "QUIZ");
        assert!(reply.text.contains("[ACTION_CARD]{\"type\":\"LINK\"}"));
    }

    #[test]
    fn plain_text_and_unclosed_marker() {
        let reply = extract_action_card(" just text ");
        assert_eq!(reply.text, "just text");
        assert_eq!(Value::Object(reply.metadata), json!({"type": "TEXT"}));

        let reply = extract_action_card("open [ACTION_CARD]{\"type\":\"LINK\"}");
        assert!(reply.text.contains("[ACTION_CARD]"));
    }

    #[test]
    fn fenced_advice_round_trips() {
        let raw = "```json\n{\"nudge\": \"Almost there\", \"trigger\": \"Finish lesson 9\", \"nextStep\": \"l9\"}\n```";
        let (advice, parsed) = parse_structured_advice(raw, Locale::En, Some("fallback"));
        assert!(parsed);
        assert_eq!(advice.nudge, "Almost there");
        assert_eq!(advice.trigger, "Finish lesson 9");
        assert_eq!(advice.next_step.as_deref(), Some("l9"));
    }

    #[test]
    fn missing_next_step_uses_default() {
        let (advice, parsed) =
            parse_structured_advice("{\"nudge\":\"n\",\"trigger\":\"t\"}", Locale::En, Some("l2"));
        assert!(parsed);
        assert_eq!(advice.next_step.as_deref(), Some("l2"));
    }

    #[test]
    fn bad_advice_falls_back() {
        for raw in ["not json", "{\"nudge\":\"only nudge\"}", "{\"nudge\":\"\",\"trigger\":\"t\"}", ""] {
            let (advice, parsed) = parse_structured_advice(raw, Locale::Vi, Some("l1"));
            assert!(!parsed, "{raw}");
            assert_eq!(advice.nudge, "Tiếp tục hành trình chinh phục tài chính của bạn!");
            assert_eq!(advice.next_step.as_deref(), Some("l1"));
        }
    }

    #[test]
    fn fallbacks_are_localized_and_non_empty() {
        for locale in Locale::ALL {
            let advice = fallback_advice(locale, None);
            assert!(!advice.nudge.is_empty());
            assert!(!advice.trigger.is_empty());
            assert!(!fallback_reply(locale).is_empty());
        }
        assert!(fallback_reply(Locale::En).starts_with("Sorry"));
    }
}
