use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{PaymentError, PaymentEvent, PaymentGateway, PaymentSession, PaymentSessionRequest};

/// Checkout sessions over the Stripe REST API (form-encoded requests, JSON replies).
#[derive(Clone, Debug)]
pub struct StripeGateway {
    client: reqwest::Client,
    api_base: String,
    secret_key: String,
}

#[derive(Deserialize)]
struct CreatedObject {
    id: Option<String>,
    url: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl StripeGateway {
    pub fn new(api_base: impl Into<String>, secret_key: impl Into<String>) -> StripeGateway {
        StripeGateway {
            client: reqwest::Client::new(),
            api_base: api_base.into(),
            secret_key: secret_key.into(),
        }
    }

    async fn post_form(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<CreatedObject, PaymentError> {
        let response = self
            .client
            .post(format!("{}{}", self.api_base, path))
            .bearer_auth(&self.secret_key)
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .ok()
                .and_then(|envelope| envelope.error.message)
                .unwrap_or(body);
            return Err(PaymentError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json::<CreatedObject>().await?)
    }

    /// One-time amount-off coupon mirroring the order discount.
    async fn create_discount(&self, amount: i64, currency: &str) -> Result<String, PaymentError> {
        let form = vec![
            ("amount_off".to_owned(), amount.to_string()),
            ("currency".to_owned(), currency.to_owned()),
            ("duration".to_owned(), "once".to_owned()),
        ];
        self.post_form("/v1/coupons", &form)
            .await?
            .id
            .ok_or(PaymentError::MissingField("id"))
    }
}

/// Flattens a session request into Stripe's bracketed form keys.
pub fn session_form(request: &PaymentSessionRequest, discount_id: Option<&str>) -> Vec<(String, String)> {
    let mut form = vec![
        ("mode".to_owned(), "payment".to_owned()),
        ("payment_method_types[0]".to_owned(), "card".to_owned()),
        ("success_url".to_owned(), request.success_url.clone()),
        ("cancel_url".to_owned(), request.cancel_url.clone()),
        ("metadata[order_id]".to_owned(), request.order_id.to_string()),
        ("metadata[user_id]".to_owned(), request.user_id.to_string()),
    ];
    for (i, item) in request.line_items.iter().enumerate() {
        let prefix = format!("line_items[{}]", i);
        form.push((format!("{}[quantity]", prefix), item.quantity.to_string()));
        form.push((format!("{}[price_data][currency]", prefix), request.currency.clone()));
        form.push((format!("{}[price_data][unit_amount]", prefix), item.unit_amount.to_string()));
        form.push((format!("{}[price_data][product_data][name]", prefix), item.name.clone()));
        if let Some(description) = &item.description {
            form.push((
                format!("{}[price_data][product_data][description]", prefix),
                description.clone(),
            ));
        }
    }
    if let Some(id) = discount_id {
        form.push(("discounts[0][coupon]".to_owned(), id.to_owned()));
    }
    form
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_session(
        &self,
        request: PaymentSessionRequest,
    ) -> Result<PaymentSession, PaymentError> {
        let discount_id = match request.discount {
            Some(amount) if amount > 0 => Some(self.create_discount(amount, &request.currency).await?),
            _ => None,
        };
        let form = session_form(&request, discount_id.as_deref());
        let created = self.post_form("/v1/checkout/sessions", &form).await?;
        let session = PaymentSession {
            id: created.id.ok_or(PaymentError::MissingField("id"))?,
            url: created.url.ok_or(PaymentError::MissingField("url"))?,
        };
        debug!(order_id = request.order_id, session_id = %session.id, "Created payment session");
        Ok(session)
    }
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    data: RawEventData,
}

#[derive(Deserialize)]
struct RawEventData {
    object: Value,
}

/// `payment_intent` is either an id string or an expanded object.
fn payment_intent_of(object: &Value) -> Option<String> {
    match object.get("payment_intent")? {
        Value::String(id) => Some(id.clone()),
        Value::Object(expanded) => expanded.get("id")?.as_str().map(str::to_owned),
        _ => None,
    }
}

fn order_id_of(object: &Value) -> Option<i32> {
    match object.get("metadata")?.get("order_id")? {
        Value::String(id) => id.parse().ok(),
        Value::Number(id) => id.as_i64().and_then(|id| i32::try_from(id).ok()),
        _ => None,
    }
}

/// Maps a verified webhook body to the event the reconciler understands.
/// `Ok(None)` is an event type we do not act on, or one missing its order reference.
pub fn parse_event(body: &[u8]) -> Result<Option<PaymentEvent>, serde_json::Error> {
    let raw: RawEvent = serde_json::from_slice(body)?;
    let object = &raw.data.object;

    let event = match raw.kind.as_str() {
        "checkout.session.completed" => order_id_of(object).map(|order_id| PaymentEvent::PaymentCompleted {
            order_id,
            payment_intent_id: payment_intent_of(object),
        }),
        "checkout.session.expired" => {
            order_id_of(object).map(|order_id| PaymentEvent::PaymentSessionExpired { order_id })
        }
        "charge.refunded" => payment_intent_of(object)
            .map(|payment_intent_id| PaymentEvent::ChargeRefunded { payment_intent_id }),
        other => {
            debug!(event_type = other, "Ignoring payment event type");
            return Ok(None);
        }
    };

    if event.is_none() {
        warn!(event_type = %raw.kind, "Payment event is missing its order reference");
    }
    Ok(event)
}
