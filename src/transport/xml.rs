//! Generic XML-to-JSON conversion for ergonomic SOAP response access.
//!
//! Element names become object keys with namespaces stripped, repeated
//! siblings fold into arrays, attributes live under an `"@attrs"` key, and
//! text content becomes the element value (or `"#text"` when the element also
//! carries attributes or children).

// crates.io
use quick_xml::{Reader, escape::unescape, events::Event};
// self
use crate::{_prelude::*, error::ParseError};

/// Converts an XML document into a JSON value keyed by its root element.
pub fn xml_to_value(xml: &str) -> Result<Value, ParseError> {
	let mut reader = Reader::from_str(xml);

	reader.config_mut().trim_text(true);

	let mut stack: Vec<Element> = vec![Element::root()];

	loop {
		match reader.read_event().map_err(|e| ParseError::Xml { detail: e.to_string() })? {
			Event::Start(start) => {
				let mut element = Element::named(local_name(start.name().as_ref()));

				for attribute in start.attributes() {
					let attribute =
						attribute.map_err(|e| ParseError::Xml { detail: e.to_string() })?;
					let key = local_name(attribute.key.as_ref());
					let value = attribute
						.unescape_value()
						.map_err(|e| ParseError::Xml { detail: e.to_string() })?
						.into_owned();

					element.attrs.insert(key, Value::String(value));
				}

				stack.push(element);
			},
			Event::Empty(empty) => {
				let mut element = Element::named(local_name(empty.name().as_ref()));

				for attribute in empty.attributes() {
					let attribute =
						attribute.map_err(|e| ParseError::Xml { detail: e.to_string() })?;
					let key = local_name(attribute.key.as_ref());
					let value = attribute
						.unescape_value()
						.map_err(|e| ParseError::Xml { detail: e.to_string() })?
						.into_owned();

					element.attrs.insert(key, Value::String(value));
				}

				let (name, value) = element.finish();

				fold_into_parent(&mut stack, name, value)?;
			},
			Event::Text(text) => {
				let decoded = reader
					.decoder()
					.decode(text.as_ref())
					.map_err(|e| ParseError::Xml { detail: e.to_string() })?;
				let unescaped = unescape(&decoded).unwrap_or(decoded.clone());

				if let Some(element) = stack.last_mut() {
					element.text.push_str(&unescaped);
				}
			},
			Event::CData(cdata) => {
				let decoded = reader
					.decoder()
					.decode(cdata.as_ref())
					.map_err(|e| ParseError::Xml { detail: e.to_string() })?;

				if let Some(element) = stack.last_mut() {
					element.text.push_str(&decoded);
				}
			},
			Event::End(_) => {
				let element = stack
					.pop()
					.ok_or_else(|| ParseError::Xml { detail: "unbalanced end tag".into() })?;
				let (name, value) = element.finish();

				fold_into_parent(&mut stack, name, value)?;
			},
			Event::Eof => break,
			// Declarations, comments, processing instructions, and doctypes
			// carry nothing the engine reads.
			_ => {},
		}
	}

	let root = stack
		.pop()
		.ok_or_else(|| ParseError::Xml { detail: "document produced no root".into() })?;

	Ok(Value::Object(root.children))
}

/// Normalizes a value that folds repeated siblings: absent becomes empty,
/// a single object becomes a one-element list, an array is passed through.
pub fn as_list(value: Option<&Value>) -> Vec<Value> {
	match value {
		None | Some(Value::Null) => Vec::new(),
		Some(Value::Array(items)) => items.clone(),
		Some(single) => vec![single.clone()],
	}
}

/// Returns a child element's text content, when present.
pub fn text_of<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
	match value.get(key) {
		Some(Value::String(text)) => Some(text),
		Some(Value::Object(map)) => map.get("#text").and_then(Value::as_str),
		_ => None,
	}
}

struct Element {
	name: String,
	attrs: JsonMap<String, Value>,
	children: JsonMap<String, Value>,
	text: String,
}
impl Element {
	fn root() -> Self {
		Self::named(String::new())
	}

	fn named(name: String) -> Self {
		Self { name, attrs: JsonMap::new(), children: JsonMap::new(), text: String::new() }
	}

	fn finish(self) -> (String, Value) {
		let text = self.text.trim().to_owned();
		let value = if self.children.is_empty() && self.attrs.is_empty() {
			if text.is_empty() { Value::Null } else { Value::String(text) }
		} else {
			let mut map = self.children;

			if !self.attrs.is_empty() {
				map.insert("@attrs".into(), Value::Object(self.attrs));
			}
			if !text.is_empty() {
				map.insert("#text".into(), Value::String(text));
			}

			Value::Object(map)
		};

		(self.name, value)
	}
}

fn fold_into_parent(stack: &mut [Element], name: String, value: Value) -> Result<(), ParseError> {
	let parent = stack
		.last_mut()
		.ok_or_else(|| ParseError::Xml { detail: "element closed outside the root".into() })?;

	match parent.children.get_mut(&name) {
		None => {
			parent.children.insert(name, value);
		},
		Some(Value::Array(existing)) => {
			existing.push(value);
		},
		Some(existing) => {
			let first = existing.take();

			*existing = Value::Array(vec![first, value]);
		},
	}

	Ok(())
}

fn local_name(raw: &[u8]) -> String {
	let name = String::from_utf8_lossy(raw);

	match name.rsplit_once(':') {
		Some((_, local)) => local.to_owned(),
		None => name.into_owned(),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn namespaces_are_stripped_and_siblings_fold() {
		let xml = r#"<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
			<soap:Body>
				<RetrieveResponseMsg>
					<OverallStatus>OK</OverallStatus>
					<Results><Name>first</Name></Results>
					<Results><Name>second</Name></Results>
				</RetrieveResponseMsg>
			</soap:Body>
		</soap:Envelope>"#;
		let value = xml_to_value(xml).expect("Envelope should convert.");
		let message = &value["Envelope"]["Body"]["RetrieveResponseMsg"];

		assert_eq!(message["OverallStatus"], "OK");

		let results = as_list(message.get("Results"));

		assert_eq!(results.len(), 2);
		assert_eq!(results[0]["Name"], "first");
		assert_eq!(results[1]["Name"], "second");
	}

	#[test]
	fn attributes_land_under_attrs_key() {
		let xml = r#"<Root><Item id="42" kind="demo">payload</Item></Root>"#;
		let value = xml_to_value(xml).expect("Document should convert.");
		let item = &value["Root"]["Item"];

		assert_eq!(item["@attrs"]["id"], "42");
		assert_eq!(item["@attrs"]["kind"], "demo");
		assert_eq!(item["#text"], "payload");
	}

	#[test]
	fn lone_text_elements_collapse_to_strings() {
		let xml = "<Root><Status>MoreDataAvailable</Status><Empty/></Root>";
		let value = xml_to_value(xml).expect("Document should convert.");

		assert_eq!(value["Root"]["Status"], "MoreDataAvailable");
		assert_eq!(value["Root"]["Empty"], Value::Null);
		assert_eq!(text_of(&value["Root"], "Status"), Some("MoreDataAvailable"));
	}

	#[test]
	fn escaped_entities_unescape_in_text() {
		let xml = "<Root><Query>SELECT a FROM b WHERE a &gt; 1 &amp;&amp; a &lt; 9</Query></Root>";
		let value = xml_to_value(xml).expect("Document should convert.");

		assert_eq!(value["Root"]["Query"], "SELECT a FROM b WHERE a > 1 && a < 9");
	}

	#[test]
	fn as_list_wraps_single_objects() {
		let single = serde_json::json!({"Name": "only"});

		assert_eq!(as_list(Some(&single)).len(), 1);
		assert!(as_list(None).is_empty());
		assert!(as_list(Some(&Value::Null)).is_empty());
	}
}
