//! Scripted producer: offline replay of canned pharmacy conversations
//!
//! The last user message is classified by keyword into a [`Scenario`] and
//! the matching event sequence is replayed with a fixed delay between
//! events. Stock, medication and prescription figures mirror the seed data
//! of the pharmacy backend.

use super::{EventProducer, EventStream, TransportError};
use crate::wire::{ChatRequest, StreamEvent, ToolCallTrace, ToolError, ToolResultTrace};
use async_trait::async_trait;
use futures::StreamExt;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::sync::LazyLock;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const BRANCHES: [&str; 3] = ["Main Street", "Downtown", "Airport"];

/// User whose prescriptions are used when the request carries no user id
const DEFAULT_USER_ID: i64 = 1;

/// One catalogue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Medication {
    pub id: i64,
    pub name: &'static str,
    pub hebrew_name: &'static str,
    pub active_ingredient: &'static str,
    pub dosage_form: &'static str,
    pub strength: &'static str,
    pub usage_instructions: &'static str,
    pub requires_prescription: bool,
    /// Units on hand, indexed like [`BRANCHES`]
    pub stock: [u32; 3],
}

pub static MEDICATIONS: [Medication; 5] = [
    Medication {
        id: 1,
        name: "Aspirin",
        hebrew_name: "אספירין",
        active_ingredient: "Acetylsalicylic acid",
        dosage_form: "Tablet",
        strength: "500mg",
        usage_instructions: "Take 1-2 tablets every 4-6 hours as needed for pain or fever. Do not exceed 8 tablets in 24 hours.",
        requires_prescription: false,
        stock: [150, 25, 10],
    },
    Medication {
        id: 2,
        name: "Ibuprofen",
        hebrew_name: "איבופרופן",
        active_ingredient: "Ibuprofen",
        dosage_form: "Tablet",
        strength: "400mg",
        usage_instructions: "Take 1 tablet every 6-8 hours as needed for pain or inflammation. Maximum 3 tablets per day. Take with food.",
        requires_prescription: false,
        stock: [80, 60, 40],
    },
    Medication {
        id: 3,
        name: "Amoxicillin",
        hebrew_name: "אמוקסיצילין",
        active_ingredient: "Amoxicillin trihydrate",
        dosage_form: "Capsule",
        strength: "500mg",
        usage_instructions: "Take 1 capsule every 8 hours for 7-10 days as prescribed. Complete the full course even if feeling better.",
        requires_prescription: true,
        stock: [30, 15, 0],
    },
    Medication {
        id: 4,
        name: "Omeprazole",
        hebrew_name: "אומפרזול",
        active_ingredient: "Omeprazole",
        dosage_form: "Capsule",
        strength: "20mg",
        usage_instructions: "Take 1 capsule once daily, preferably in the morning before breakfast. Swallow whole.",
        requires_prescription: true,
        stock: [20, 5, 8],
    },
    Medication {
        id: 5,
        name: "Vitamin D3",
        hebrew_name: "ויטמין D3",
        active_ingredient: "Cholecalciferol",
        dosage_form: "Softgel",
        strength: "1000 IU",
        usage_instructions: "Take 1 softgel daily with a meal containing fat for better absorption.",
        requires_prescription: false,
        stock: [200, 180, 150],
    },
];

impl Medication {
    pub fn total_stock(&self) -> u32 {
        self.stock.iter().sum()
    }

    /// Find a medication mentioned anywhere in `text`
    pub fn mentioned_in(text: &str) -> Option<&'static Medication> {
        let lower = text.to_lowercase();
        MEDICATIONS
            .iter()
            .find(|m| lower.contains(&m.name.to_lowercase()) || text.contains(m.hebrew_name))
    }
}

/// Canned conversation selected for a user message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Starts answering, then the service reports an error
    SimulatedFailure,
    PrescriptionRefill,
    PrescriptionRequirement(Option<&'static Medication>),
    StockCheck(Option<&'static Medication>),
    MedicationInfo(&'static Medication),
    Fallback,
}

static FAILURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(simulate|fail|failure|crash|error)\b|שגיאה|תקלה")
        .expect("failure regex should compile")
});
static REFILL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(refill|renew|reorder)|חידוש|לחדש|מילוי")
        .expect("refill regex should compile")
});
static REQUIREMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bprescription|\brx\b|מרשם").expect("requirement regex should compile")
});
static STOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(stock|available|availability|in store|have any)\b|מלאי|זמין|יש לכם")
        .expect("stock regex should compile")
});

/// Pick the scenario for a user message
pub fn classify(text: &str) -> Scenario {
    let medication = Medication::mentioned_in(text);
    if FAILURE.is_match(text) {
        Scenario::SimulatedFailure
    } else if REFILL.is_match(text) {
        Scenario::PrescriptionRefill
    } else if REQUIREMENT.is_match(text) {
        Scenario::PrescriptionRequirement(medication)
    } else if STOCK.is_match(text) {
        Scenario::StockCheck(medication)
    } else if let Some(medication) = medication {
        Scenario::MedicationInfo(medication)
    } else {
        Scenario::Fallback
    }
}

pub fn is_hebrew(text: &str) -> bool {
    text.chars().any(|c| ('\u{0590}'..='\u{05FF}').contains(&c))
}

/// Accumulates a scripted turn, keeping the final trace consistent with
/// the events emitted before it
#[derive(Default)]
struct Script {
    events: Vec<StreamEvent>,
    calls: Vec<ToolCallTrace>,
    results: Vec<ToolResultTrace>,
}

impl Script {
    fn call(&mut self, name: &str, arguments: Value) -> String {
        let id = format!("call_{}", self.calls.len() + 1);
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.calls.push(ToolCallTrace {
            id: id.clone(),
            name: name.to_string(),
            arguments: arguments.clone(),
        });
        self.events.push(StreamEvent::ToolCall {
            id: id.clone(),
            name: name.to_string(),
            arguments,
        });
        id
    }

    fn result(&mut self, id: &str, name: &str, outcome: Result<Value, ToolError>) {
        let (success, result, error) = match outcome {
            Ok(value) => (true, Some(value), None),
            Err(error) => (false, None, Some(error)),
        };
        self.results.push(ToolResultTrace {
            tool_call_id: id.to_string(),
            name: name.to_string(),
            success,
            result: result.clone(),
            error: error.clone(),
        });
        self.events.push(StreamEvent::ToolResult {
            tool_call_id: id.to_string(),
            name: name.to_string(),
            success,
            result,
            error,
        });
    }

    /// Stream `text` as word-sized tokens; tokens concatenate to `text`
    fn tokens(&mut self, text: &str) {
        self.events
            .extend(text.split_inclusive(' ').map(StreamEvent::token));
    }

    /// Stream `text` and close the turn with it as the final content
    fn reply(mut self, text: &str) -> Vec<StreamEvent> {
        self.tokens(text);
        self.events.push(StreamEvent::FinalMessage {
            content: text.to_string(),
            tool_calls: self.calls,
            tool_results: self.results,
        });
        self.events
    }

    fn fail(mut self, partial: &str, message: &str, code: &str) -> Vec<StreamEvent> {
        self.tokens(partial);
        self.events.push(StreamEvent::error(message, Some(code)));
        self.events
    }
}

/// Event sequence for `scenario`, answered in Hebrew when `hebrew`
pub fn script(scenario: Scenario, hebrew: bool, user_id: Option<i64>) -> Vec<StreamEvent> {
    let mut script = Script::default();
    match scenario {
        Scenario::SimulatedFailure => {
            let partial = if hebrew { "רק רגע, אני בודק " } else { "Let me check that for you " };
            script.fail(
                partial,
                "The assistant service is temporarily unavailable",
                "SERVICE_UNAVAILABLE",
            )
        }

        Scenario::StockCheck(Some(medication)) => {
            let id = script.call(
                "check_medication_stock",
                json!({"medication_name": medication.name}),
            );
            script.result(&id, "check_medication_stock", Ok(stock_data(medication)));
            script.reply(&stock_reply(medication, hebrew))
        }

        Scenario::StockCheck(None) => {
            let text = if hebrew {
                "איזו תרופה תרצה שאבדוק במלאי?"
            } else {
                "Which medication would you like me to check stock for?"
            };
            script.reply(text)
        }

        Scenario::PrescriptionRequirement(Some(medication)) => {
            let id = script.call(
                "get_prescription_requirement",
                json!({"medication_name": medication.name}),
            );
            script.result(
                &id,
                "get_prescription_requirement",
                Ok(json!({
                    "medication_name": medication.name,
                    "medication_name_he": medication.hebrew_name,
                    "requires_prescription": medication.requires_prescription,
                })),
            );
            script.reply(&requirement_reply(medication, hebrew))
        }

        Scenario::PrescriptionRequirement(None) => {
            let id = script.call("get_prescription_requirement", json!({"medication_name": ""}));
            script.result(
                &id,
                "get_prescription_requirement",
                Err(ToolError::new("INVALID_INPUT", "Medication name is required")),
            );
            let text = if hebrew {
                "לאיזו תרופה אתה שואל לגבי מרשם?"
            } else {
                "Which medication are you asking about? I can check whether it needs a prescription."
            };
            script.reply(text)
        }

        Scenario::PrescriptionRefill => {
            let user_id = user_id.unwrap_or(DEFAULT_USER_ID);
            let list = script.call(
                "list_user_prescriptions",
                json!({"user_id": user_id, "status": "active"}),
            );
            script.result(
                &list,
                "list_user_prescriptions",
                Ok(json!({
                    "user_id": user_id,
                    "user_name": "David Cohen",
                    "filter": "active",
                    "prescriptions": [{
                        "prescription_id": 1,
                        "medication_name": "Omeprazole",
                        "medication_name_he": "אומפרזול",
                        "refills_allowed": 5,
                        "refills_used": 2,
                        "refills_remaining": 3,
                        "can_refill": true,
                        "prescribing_doctor": "Dr. Ruth Avraham",
                    }],
                    "count": 1,
                })),
            );
            let refill = script.call(
                "request_prescription_refill",
                json!({"user_id": user_id, "prescription_id": 1}),
            );
            script.result(
                &refill,
                "request_prescription_refill",
                Ok(json!({
                    "request_id": 1,
                    "status": "pending",
                    "prescription_id": 1,
                    "medication_name": "Omeprazole",
                    "refills_remaining_after": 2,
                })),
            );
            let text = if hebrew {
                "בקשת המילוי מספר 1 עבור אומפרזול נשלחה בהצלחה. היא תהיה מוכנה לאיסוף בעוד 2-3 שעות. נותרו לך 2 מילויים."
            } else {
                "Refill request #1 submitted successfully for Omeprazole. It will be ready for pickup in 2-3 hours. You have 2 refills remaining."
            };
            script.reply(text)
        }

        Scenario::MedicationInfo(medication) => {
            let id = script.call(
                "get_medication_by_name",
                json!({"name": medication.name, "lang": if hebrew { "he" } else { "en" }}),
            );
            script.result(
                &id,
                "get_medication_by_name",
                Ok(json!({
                    "id": medication.id,
                    "name": medication.name,
                    "name_he": medication.hebrew_name,
                    "active_ingredient": medication.active_ingredient,
                    "dosage_form": medication.dosage_form,
                    "strength": medication.strength,
                    "usage_instructions": medication.usage_instructions,
                    "requires_prescription": medication.requires_prescription,
                })),
            );
            script.reply(&info_reply(medication, hebrew))
        }

        Scenario::Fallback => {
            let text = if hebrew {
                "שלום! אני העוזר של בית המרקחת. אפשר לשאול אותי על מלאי תרופות, הוראות שימוש ומרשמים."
            } else {
                "Hello! I'm the pharmacy assistant. I can check medication stock, explain how to take a medication, and help with prescriptions."
            };
            script.reply(text)
        }
    }
}

fn stock_data(medication: &Medication) -> Value {
    let branches: Vec<Value> = BRANCHES
        .iter()
        .zip(medication.stock)
        .map(|(branch, quantity)| {
            json!({"branch": branch, "quantity": quantity, "available": quantity > 0})
        })
        .collect();
    json!({
        "medication_name": medication.name,
        "medication_name_he": medication.hebrew_name,
        "branches": branches,
        "total_quantity": medication.total_stock(),
        "any_available": medication.total_stock() > 0,
    })
}

fn stock_reply(medication: &Medication, hebrew: bool) -> String {
    let listing: Vec<String> = BRANCHES
        .iter()
        .zip(medication.stock)
        .map(|(branch, quantity)| format!("{branch}: {quantity}"))
        .collect();
    if hebrew {
        format!(
            "מלאי {} לפי סניף: {}.",
            medication.hebrew_name,
            listing.join(", ")
        )
    } else {
        format!(
            "{} stock by branch: {}.",
            medication.name,
            listing.join(", ")
        )
    }
}

fn requirement_reply(medication: &Medication, hebrew: bool) -> String {
    match (hebrew, medication.requires_prescription) {
        (true, true) => format!("{} דורש מרשם רופא.", medication.hebrew_name),
        (true, false) => format!("{} אינו דורש מרשם.", medication.hebrew_name),
        (false, true) => format!("{} requires a doctor's prescription.", medication.name),
        (false, false) => format!(
            "{} is available without a prescription.",
            medication.name
        ),
    }
}

fn info_reply(medication: &Medication, hebrew: bool) -> String {
    if hebrew {
        format!(
            "{} ({} {}): {}",
            medication.hebrew_name,
            medication.dosage_form,
            medication.strength,
            medication.usage_instructions
        )
    } else {
        format!(
            "{} {} {}. Active ingredient: {}. {}",
            medication.name,
            medication.strength,
            medication.dosage_form.to_lowercase(),
            medication.active_ingredient,
            medication.usage_instructions
        )
    }
}

/// Producer that answers from canned scripts instead of the network
pub struct ScriptedProducer {
    delay: Duration,
}

impl ScriptedProducer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl EventProducer for ScriptedProducer {
    async fn open(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<EventStream, TransportError> {
        let text = request
            .last_user_text()
            .ok_or_else(|| TransportError::unavailable("No user message to answer"))?;
        let scenario = classify(text);
        let events = script(scenario, is_hebrew(text), request.user_id);
        tracing::debug!(?scenario, events = events.len(), "Replaying scripted turn");

        let delay = self.delay;
        Ok(futures::stream::iter(events)
            .then(move |event| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok::<_, TransportError>(event)
            })
            .take_until(cancel.cancelled_owned())
            .boxed())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
