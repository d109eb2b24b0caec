//! SOAP transport for the platform's classic XML surface.
//!
//! Envelopes carry the access token in a `fueloauth` header element. Retrieves
//! iterate pages through `ContinueRequest` elements keyed by the returned
//! `RequestID` while `OverallStatus` stays `MoreDataAvailable`, bounded by a
//! hard page ceiling.

// crates.io
use quick_xml::escape::escape;
use reqwest::Client as ReqwestClient;
// self
use crate::{
	_prelude::*,
	auth::TokenManager,
	config::EngineConfig,
	error::{AuthError, ParseError, TransportError},
	obs::{self, ObsEvent, Outcome, Stage, WorkSpan},
	transport::{self, RetryPolicy, SOAP_PAGE_CEILING, xml},
};

const PARTNER_NS: &str = "http://exacttarget.com/wsdl/partnerAPI";

/// Simple property filter attached to a Retrieve request.
#[derive(Clone, Debug)]
pub struct SoapFilter {
	/// Property the filter applies to.
	pub property: String,
	/// Platform operator name (`equals`, `like`, `IN`, ...).
	pub operator: String,
	/// Filter operands.
	pub values: Vec<String>,
}
impl SoapFilter {
	/// Builds an `equals` filter for one property/value pair.
	pub fn equals(property: impl Into<String>, value: impl Into<String>) -> Self {
		Self { property: property.into(), operator: "equals".into(), values: vec![value.into()] }
	}
}

/// Accumulated result of a retrieve-all loop.
#[derive(Clone, Debug, Default)]
pub struct SoapRetrieval {
	/// Raw result records across all pages, in response order.
	pub records: Vec<Value>,
	/// Pages fetched.
	pub pages: u32,
	/// `true` when the hard page ceiling cut the iteration short.
	pub truncated: bool,
}

/// SOAP transport client.
#[derive(Clone, Debug)]
pub struct SoapClient {
	http: ReqwestClient,
	endpoint: Url,
	tokens: Arc<TokenManager>,
	policy: RetryPolicy,
	cancel: CancellationToken,
}
impl SoapClient {
	/// Creates a client for the configured SOAP endpoint.
	pub fn new(
		config: &EngineConfig,
		http: ReqwestClient,
		tokens: Arc<TokenManager>,
		cancel: CancellationToken,
	) -> Self {
		Self {
			http,
			endpoint: config.soap_base.clone(),
			tokens,
			policy: RetryPolicy::default(),
			cancel,
		}
	}

	/// Overrides the retry policy (tests shrink the backoff base).
	pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
		self.policy = policy;

		self
	}

	/// Retrieves every page of an object type, following continuation tokens.
	pub async fn retrieve_all(
		&self,
		object_type: &str,
		properties: &[&str],
		filter: Option<&SoapFilter>,
	) -> Result<SoapRetrieval> {
		let span = WorkSpan::request(Stage::Soap, object_type);
		let fut = async {
			let mut retrieval = SoapRetrieval::default();
			let mut continue_id: Option<String> = None;

			for page in 1..=SOAP_PAGE_CEILING {
				let envelope = self
					.render_envelope(object_type, properties, filter, continue_id.as_deref())
					.await?;
				let response = self.post_envelope(&envelope).await?;
				let message = &response["Envelope"]["Body"]["RetrieveResponseMsg"];

				if message.is_null() {
					return Err(ParseError::MissingField {
						field: "RetrieveResponseMsg",
						context: "SOAP retrieve",
					}
					.into());
				}

				let overall = xml::text_of(message, "OverallStatus").unwrap_or_default().to_owned();

				if overall.starts_with("Error") {
					return Err(TransportError::SoapFault {
						endpoint: object_type.to_owned(),
						fault: overall,
					}
					.into());
				}

				retrieval.pages = page;
				retrieval.records.extend(xml::as_list(message.get("Results")));

				if overall != "MoreDataAvailable" {
					return Ok(retrieval);
				}

				continue_id = xml::text_of(message, "RequestID").map(str::to_owned);

				if continue_id.is_none() {
					return Err(ParseError::MissingField {
						field: "RequestID",
						context: "SOAP continue",
					}
					.into());
				}
				if page == SOAP_PAGE_CEILING {
					retrieval.truncated = true;
				}
			}

			Ok(retrieval)
		};

		span.wrap(fut).await
	}

	async fn render_envelope(
		&self,
		object_type: &str,
		properties: &[&str],
		filter: Option<&SoapFilter>,
		continue_id: Option<&str>,
	) -> Result<String> {
		let bearer = self.tokens.bearer().await?;

		Ok(build_retrieve_envelope(
			&bearer,
			self.endpoint.as_str(),
			object_type,
			properties,
			filter,
			continue_id,
		))
	}

	/// Posts an envelope with full retry semantics; expired-token faults are
	/// replayed once after a forced refresh, mirroring the REST 401 path.
	async fn post_envelope(&self, envelope: &str) -> Result<Value> {
		let endpoint = self.endpoint.path().to_owned();
		let mut attempt: u32 = 1;
		let mut throttle_waits: u32 = 0;
		let mut replayed_after_refresh = false;
		let mut envelope = envelope.to_owned();

		loop {
			if self.cancel.is_cancelled() {
				return Err(Error::Canceled);
			}

			obs::emit(ObsEvent::Call { stage: Stage::Soap, outcome: Outcome::Attempt });

			let send = self
				.http
				.post(self.endpoint.clone())
				.header("Content-Type", "text/xml; charset=UTF-8")
				.header("SOAPAction", "Retrieve")
				.body(envelope.clone())
				.send();
			let outcome = tokio::select! {
				outcome = send => outcome,
				_ = self.cancel.cancelled() => return Err(Error::Canceled),
			};
			let response = match outcome {
				Ok(response) => response,
				Err(network) => {
					if attempt >= self.policy.attempts {
						obs::emit(ObsEvent::Call { stage: Stage::Soap, outcome: Outcome::Failure });

						return Err(TransportError::NetworkExhausted {
							endpoint,
							attempts: attempt,
							source: Box::new(network),
						}
						.into());
					}

					obs::emit(ObsEvent::Call { stage: Stage::Soap, outcome: Outcome::Retry });
					self.sleep(self.policy.backoff(attempt)).await?;

					attempt += 1;

					continue;
				},
			};
			let status = response.status().as_u16();
			let retry_after = transport::parse_retry_after(response.headers());
			let body = tokio::select! {
				outcome = response.text() => outcome,
				_ = self.cancel.cancelled() => return Err(Error::Canceled),
			}
			.map_err(|network| TransportError::NetworkExhausted {
				endpoint: endpoint.clone(),
				attempts: attempt,
				source: Box::new(network),
			})?;

			if let Ok(parsed) = xml::xml_to_value(&body) {
				let fault = &parsed["Envelope"]["Body"]["Fault"];

				if !fault.is_null() {
					let fault_text = fault_summary(fault);

					// The SOAP surface has no HTTP 401; an expired `fueloauth`
					// token surfaces as a security fault instead.
					if fault_text.to_ascii_lowercase().contains("token expired") {
						if replayed_after_refresh {
							obs::emit(ObsEvent::Call { stage: Stage::Soap, outcome: Outcome::Failure });

							return Err(AuthError::StillUnauthorized.into());
						}

						replayed_after_refresh = true;

						let bearer = self.tokens.force_refresh("soap_token_expired").await?;

						envelope = swap_fueloauth(&envelope, &bearer);

						continue;
					}

					obs::emit(ObsEvent::Call { stage: Stage::Soap, outcome: Outcome::Failure });

					return Err(TransportError::SoapFault { endpoint, fault: fault_text }.into());
				}
				if (200..300).contains(&status) {
					obs::emit(ObsEvent::Call { stage: Stage::Soap, outcome: Outcome::Success });

					return Ok(parsed);
				}
			}

			if RetryPolicy::is_retryable_status(status) {
				// Same Retry-After discipline as the REST path: an explicit
				// hint draws on the throttle budget, not the attempt counter.
				if status == 429
					&& let Some(hinted) = retry_after
					&& throttle_waits < self.policy.throttle_waits
				{
					throttle_waits += 1;

					obs::emit(ObsEvent::ThrottleWait {
						stage: Stage::Soap,
						wait_ms: hinted.as_millis() as u64,
					});
					self.sleep(hinted).await?;

					continue;
				}
				if attempt >= self.policy.attempts {
					obs::emit(ObsEvent::Call { stage: Stage::Soap, outcome: Outcome::Failure });

					return Err(TransportError::RetryableExhausted {
						endpoint,
						status,
						attempts: attempt,
					}
					.into());
				}

				obs::emit(ObsEvent::Call { stage: Stage::Soap, outcome: Outcome::Retry });
				self.sleep(self.policy.backoff(attempt)).await?;

				attempt += 1;

				continue;
			}

			obs::emit(ObsEvent::Call { stage: Stage::Soap, outcome: Outcome::Failure });

			return Err(TransportError::NonRetryable {
				endpoint,
				status,
				detail: transport::truncate_detail(&body),
			}
			.into());
		}
	}

	async fn sleep(&self, wait: StdDuration) -> Result<()> {
		tokio::select! {
			_ = tokio::time::sleep(wait) => Ok(()),
			_ = self.cancel.cancelled() => Err(Error::Canceled),
		}
	}
}

fn build_retrieve_envelope(
	bearer: &str,
	endpoint: &str,
	object_type: &str,
	properties: &[&str],
	filter: Option<&SoapFilter>,
	continue_id: Option<&str>,
) -> String {
	let mut body = String::with_capacity(1_024);

	body.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
	body.push_str(
		"<s:Envelope xmlns:s=\"http://www.w3.org/2003/05/soap-envelope\" \
		 xmlns:a=\"http://schemas.xmlsoap.org/ws/2004/08/addressing\">",
	);
	body.push_str("<s:Header>");
	body.push_str("<a:Action s:mustUnderstand=\"1\">Retrieve</a:Action>");
	body.push_str(&format!("<a:To s:mustUnderstand=\"1\">{}</a:To>", escape(endpoint)));
	body.push_str(&format!(
		"<fueloauth xmlns=\"http://exacttarget.com\">{}</fueloauth>",
		escape(bearer),
	));
	body.push_str("</s:Header>");
	body.push_str("<s:Body>");
	body.push_str(&format!("<RetrieveRequestMsg xmlns=\"{PARTNER_NS}\">"));
	body.push_str("<RetrieveRequest>");

	// Continuation requests carry only the request id and object type; the
	// server replays the original property/filter selection.
	if let Some(id) = continue_id {
		body.push_str(&format!("<ContinueRequest>{}</ContinueRequest>", escape(id)));
		body.push_str(&format!("<ObjectType>{}</ObjectType>", escape(object_type)));
	} else {
		body.push_str(&format!("<ObjectType>{}</ObjectType>", escape(object_type)));

		for property in properties {
			body.push_str(&format!("<Properties>{}</Properties>", escape(*property)));
		}

		if let Some(filter) = filter {
			body.push_str(
				"<Filter xsi:type=\"SimpleFilterPart\" \
				 xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\">",
			);
			body.push_str(&format!("<Property>{}</Property>", escape(&filter.property)));
			body.push_str(&format!(
				"<SimpleOperator>{}</SimpleOperator>",
				escape(&filter.operator),
			));

			for value in &filter.values {
				body.push_str(&format!("<Value>{}</Value>", escape(value)));
			}

			body.push_str("</Filter>");
		}
	}

	body.push_str("</RetrieveRequest>");
	body.push_str("</RetrieveRequestMsg>");
	body.push_str("</s:Body>");
	body.push_str("</s:Envelope>");

	body
}

fn fault_summary(fault: &Value) -> String {
	let reason = xml::text_of(fault, "faultstring")
		.or_else(|| {
			fault
				.get("Reason")
				.and_then(|reason| xml::text_of(reason, "Text"))
		})
		.unwrap_or("unspecified fault");
	let code = xml::text_of(fault, "faultcode")
		.or_else(|| fault.get("Code").and_then(|code| xml::text_of(code, "Value")))
		.unwrap_or_default();

	if code.is_empty() { reason.to_owned() } else { format!("{code}: {reason}") }
}

fn swap_fueloauth(envelope: &str, bearer: &str) -> String {
	let open = "<fueloauth xmlns=\"http://exacttarget.com\">";

	match envelope.split_once(open).and_then(|(head, rest)| {
		rest.split_once("</fueloauth>").map(|(_, tail)| (head, tail))
	}) {
		Some((head, tail)) => format!("{head}{open}{}</fueloauth>{tail}", escape(bearer)),
		None => envelope.to_owned(),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn envelope_carries_token_type_properties_and_filter() {
		let filter = SoapFilter::equals("Status", "Active");
		let envelope = build_retrieve_envelope(
			"bearer-token",
			"https://soap.example.com/Service.asmx",
			"TriggeredSendDefinition",
			&["Name", "CustomerKey"],
			Some(&filter),
			None,
		);

		assert!(envelope.contains(
			"<fueloauth xmlns=\"http://exacttarget.com\">bearer-token</fueloauth>"
		));
		assert!(envelope.contains("<ObjectType>TriggeredSendDefinition</ObjectType>"));
		assert!(envelope.contains("<Properties>Name</Properties>"));
		assert!(envelope.contains("<Properties>CustomerKey</Properties>"));
		assert!(envelope.contains("<SimpleOperator>equals</SimpleOperator>"));
		assert!(!envelope.contains("ContinueRequest"));
	}

	#[test]
	fn continuation_envelopes_carry_only_the_request_id_and_type() {
		let envelope = build_retrieve_envelope(
			"bearer-token",
			"https://soap.example.com/Service.asmx",
			"DataExtension",
			&["Name"],
			None,
			Some("req-123"),
		);

		assert!(envelope.contains("<ContinueRequest>req-123</ContinueRequest>"));
		assert!(envelope.contains("<ObjectType>DataExtension</ObjectType>"));
		assert!(!envelope.contains("<Properties>"));
	}

	#[test]
	fn interpolated_values_are_escaped() {
		let filter = SoapFilter::equals("Name", "a<b&c");
		let envelope = build_retrieve_envelope(
			"bearer",
			"https://soap.example.com/Service.asmx",
			"List",
			&[],
			Some(&filter),
			None,
		);

		assert!(envelope.contains("<Value>a&lt;b&amp;c</Value>"));
	}

	#[test]
	fn fueloauth_swap_replaces_only_the_token() {
		let envelope = build_retrieve_envelope(
			"stale-token",
			"https://soap.example.com/Service.asmx",
			"List",
			&["ID"],
			None,
			None,
		);
		let swapped = swap_fueloauth(&envelope, "fresh-token");

		assert!(swapped.contains(">fresh-token</fueloauth>"));
		assert!(!swapped.contains("stale-token"));
		assert!(swapped.contains("<ObjectType>List</ObjectType>"));
	}

	#[test]
	fn fault_summaries_prefer_code_and_reason() {
		let fault = serde_json::json!({
			"faultcode": "soap:Client",
			"faultstring": "Token Expired",
		});

		assert_eq!(fault_summary(&fault), "soap:Client: Token Expired");
	}
}
