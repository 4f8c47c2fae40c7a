//! Per-entity style store.
//!
//! A style is an insertion-ordered map of property names to values plus an optional block of
//! free-text class rules. Names starting with [`PREFIX`] are reserved for structured values that
//! the reconciler interprets itself (transform, asset references, flags) and that are never
//! forwarded to the surface verbatim.

use crate::asset::AssetRef;
use crate::error::StyleError;
use cgmath::{Matrix3, SquareMatrix};
use serde_json::Value;

/// Reserved name prefix for structured values.
pub const PREFIX: &str = "-cards-";
/// Flag enabling the direct-manipulation fast path.
pub const DIRECT_MANIPULATION: &str = "-cards-direct-manipulation";
/// Six-number affine transform `[a, b, c, d, e, f]`.
pub const TRANSFORM: &str = "-cards-transform";
pub const TRANSFORM_ORIGIN: &str = "-cards-transform-origin";
pub const BACKGROUND_IMAGE_ASSET: &str = "-cards-background-image-asset";

const IDENTITY: [f64; 6] = [1., 0., 0., 1., 0., 0.];

/// A style property value.
#[derive(Debug, Clone, PartialEq)]
pub enum StyleValue {
    /// Plain text, forwarded to the surface as is.
    Text(String),
    /// Structured value under a reserved name.
    Json(Value),
    /// Asset reference under a reserved name.
    Asset(AssetRef),
}

impl StyleValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            StyleValue::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Truthiness, for flags.
    pub fn is_truthy(&self) -> bool {
        match self {
            StyleValue::Text(text) => !text.is_empty(),
            StyleValue::Json(Value::Bool(b)) => *b,
            StyleValue::Json(Value::Number(n)) => n.as_f64().map_or(false, |n| n != 0.),
            StyleValue::Json(Value::String(s)) => !s.is_empty(),
            StyleValue::Json(Value::Null) => false,
            StyleValue::Json(_) => true,
            StyleValue::Asset(_) => true,
        }
    }

    /// Brings a value into the canonical form for the given name, so that stores compare equal
    /// regardless of how a value was provided.
    fn normalize(name: &str, value: StyleValue) -> StyleValue {
        if name.starts_with(PREFIX) {
            match value {
                StyleValue::Text(text) => StyleValue::Json(Value::String(text)),
                other => other,
            }
        } else {
            let text = match value {
                StyleValue::Json(Value::String(text)) => text,
                StyleValue::Json(json) => json.to_string(),
                StyleValue::Asset(asset) => asset.to_string(),
                StyleValue::Text(text) => text,
            };
            StyleValue::Text(plain_text(text))
        }
    }
}

/// A plain value as it can be written into the text form: one line, no outer blanks.
fn plain_text(text: String) -> String {
    let text = if text.contains(|c| c == '\n' || c == '\r') {
        text.replace(|c| c == '\n' || c == '\r', " ")
    } else {
        text
    };
    let trimmed = text.trim();
    if trimmed.len() == text.len() {
        text
    } else {
        trimmed.to_string()
    }
}

impl From<&str> for StyleValue {
    fn from(text: &str) -> Self {
        StyleValue::Text(text.to_string())
    }
}

impl From<String> for StyleValue {
    fn from(text: String) -> Self {
        StyleValue::Text(text)
    }
}

impl From<Value> for StyleValue {
    fn from(json: Value) -> Self {
        StyleValue::Json(json)
    }
}

impl From<AssetRef> for StyleValue {
    fn from(asset: AssetRef) -> Self {
        StyleValue::Asset(asset)
    }
}

/// A style store.
#[derive(Debug, Clone, Default)]
pub struct Style {
    local: Vec<(String, StyleValue)>,
    classes: Option<String>,
}

impl Style {
    pub fn new() -> Style {
        Style::default()
    }

    /// Parses the text form produced by [`Style::to_text`].
    ///
    /// Leading `name: value;` lines become properties; everything from the first line that is
    /// not a declaration on is the class-rule block.
    pub fn parse(text: &str) -> Result<Style, StyleError> {
        let mut style = Style::new();
        if text.is_empty() {
            return Ok(style);
        }

        let lines: Vec<&str> = text.split('\n').collect();
        let mut index = 0;
        while let Some((key, value)) = lines.get(index).and_then(|line| parse_declaration(line)) {
            let value = if key == BACKGROUND_IMAGE_ASSET {
                StyleValue::Asset(
                    AssetRef::parse(value).ok_or_else(|| StyleError::BadAsset(value.to_string()))?,
                )
            } else if key.starts_with(PREFIX) {
                let json = serde_json::from_str(value).map_err(|source| StyleError::Json {
                    key: key.to_string(),
                    source,
                })?;
                StyleValue::Json(json)
            } else {
                StyleValue::Text(value.to_string())
            };
            style.local.push((key.to_string(), value));
            index += 1;
        }

        let rest = lines[index..].join("\n");
        if !rest.trim().is_empty() {
            style.classes = Some(rest);
        }
        Ok(style)
    }

    /// Serializes into newline-joined `name: value;` declarations followed by the class block.
    pub fn to_text(&self) -> String {
        let mut lines = Vec::with_capacity(self.local.len() + 1);
        for (key, value) in &self.local {
            let text = match value {
                StyleValue::Text(text) => text.clone(),
                StyleValue::Json(json) => {
                    if json.is_object() {
                        tracing::warn!(key = %key, "object style value will not survive a round trip");
                    }
                    json.to_string()
                }
                StyleValue::Asset(asset) => asset.to_string(),
            };
            lines.push(format!("{}: {};", key, text));
        }
        if let Some(classes) = &self.classes {
            lines.push(classes.clone());
        }
        lines.join("\n")
    }

    /// Sets a property. Plain values are kept on one line without outer blanks, and an empty
    /// plain value removes the property.
    pub fn set_property(&mut self, name: &str, value: impl Into<StyleValue>) {
        let value = StyleValue::normalize(name, value.into());
        if value.as_text() == Some("") {
            self.remove_property(name);
            return;
        }
        match self.local.iter_mut().find(|(key, _)| key == name) {
            Some((_, slot)) => *slot = value,
            None => self.local.push((name.to_string(), value)),
        }
    }

    pub fn remove_property(&mut self, name: &str) -> Option<StyleValue> {
        let index = self.local.iter().position(|(key, _)| key == name)?;
        Some(self.local.remove(index).1)
    }

    pub fn property(&self, name: &str) -> Option<&StyleValue> {
        self.local
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// Iterates over properties in insertion order.
    pub fn properties(&self) -> impl Iterator<Item = (&str, &StyleValue)> {
        self.local.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_empty() && self.classes.is_none()
    }

    pub fn classes(&self) -> Option<&str> {
        self.classes.as_deref()
    }

    /// Sets the class-rule block. A blank block is no block.
    pub fn set_classes(&mut self, classes: Option<String>) {
        self.classes = classes.filter(|text| !text.trim().is_empty());
    }

    pub fn is_direct_manipulation(&self) -> bool {
        self.property(DIRECT_MANIPULATION)
            .map_or(false, StyleValue::is_truthy)
    }

    /// The transform components; identity unless direct manipulation is on.
    pub fn transform_components(&self) -> [f64; 6] {
        if !self.is_direct_manipulation() {
            return IDENTITY;
        }
        match self.property(TRANSFORM) {
            Some(StyleValue::Json(Value::Array(items))) if items.len() == 6 => {
                let mut out = IDENTITY;
                for (slot, item) in out.iter_mut().zip(items) {
                    *slot = item.as_f64().unwrap_or(*slot);
                }
                out
            }
            _ => IDENTITY,
        }
    }

    /// The transform as a matrix, in the same column layout as the CSS `matrix()` function.
    pub fn transform(&self) -> Matrix3<f64> {
        let [a, b, c, d, e, f] = self.transform_components();
        if [a, b, c, d, e, f] == IDENTITY {
            return Matrix3::identity();
        }
        Matrix3::new(a, b, 0., c, d, 0., e, f, 1.)
    }

    pub fn set_transform(&mut self, components: [f64; 6]) {
        let json = Value::Array(components.iter().map(|n| Value::from(*n)).collect());
        self.set_property(TRANSFORM, StyleValue::Json(json));
    }

    pub fn set_transform_matrix(&mut self, matrix: Matrix3<f64>) {
        self.set_transform([
            matrix.x.x, matrix.x.y, matrix.y.x, matrix.y.y, matrix.z.x, matrix.z.y,
        ]);
    }

    /// The transform origin; empty unless direct manipulation is on.
    pub fn transform_origin(&self) -> String {
        if !self.is_direct_manipulation() {
            return String::new();
        }
        match self.property(TRANSFORM_ORIGIN) {
            Some(StyleValue::Json(Value::String(origin))) => origin.clone(),
            Some(StyleValue::Json(other)) => other.to_string(),
            _ => String::new(),
        }
    }

    pub fn set_transform_origin(&mut self, origin: &str) {
        self.set_property(TRANSFORM_ORIGIN, StyleValue::Json(Value::String(origin.into())));
    }

    pub fn background_asset(&self) -> Option<&AssetRef> {
        match self.property(BACKGROUND_IMAGE_ASSET) {
            Some(StyleValue::Asset(asset)) => Some(asset),
            _ => None,
        }
    }
}

/// Equality ignores property order.
impl PartialEq for Style {
    fn eq(&self, other: &Style) -> bool {
        self.classes == other.classes
            && self.local.len() == other.local.len()
            && self
                .local
                .iter()
                .all(|(key, value)| other.property(key) == Some(value))
    }
}

/// Parses a transform from six comma-separated numbers.
pub fn parse_transform(text: &str) -> Result<[f64; 6], StyleError> {
    let numbers = text
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| StyleError::BadTransform(text.to_string()))?;
    if numbers.len() != 6 {
        return Err(StyleError::BadTransform(text.to_string()));
    }
    let mut out = IDENTITY;
    out.copy_from_slice(&numbers);
    Ok(out)
}

/// Matches `name: value;` with optional surrounding blanks. Names may not contain `{`, so
/// selector lines never match.
fn parse_declaration(line: &str) -> Option<(&str, &str)> {
    let line = line.trim_end_matches(|c| c == ' ' || c == '\t');
    let body = line.strip_suffix(';')?;
    let (key, value) = body.split_once(':')?;
    let key = key.trim_matches(|c| c == ' ' || c == '\t');
    let value = value.trim_matches(|c| c == ' ' || c == '\t');
    if key.is_empty() || key.contains('{') || value.is_empty() {
        return None;
    }
    Some((key, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn plain_round_trip() {
        let mut style = Style::new();
        style.set_property("width", "10px");
        style.set_property("background-color", "white");
        style.set_classes(Some(".card {\n  color: red;\n}".into()));

        let text = style.to_text();
        assert_eq!(
            text,
            "width: 10px;\nbackground-color: white;\n.card {\n  color: red;\n}"
        );
        assert_eq!(Style::parse(&text).unwrap(), style);
        assert_eq!(Style::parse(&text).unwrap().to_text(), text);
    }

    #[test]
    fn structured_values_round_trip() {
        let mut style = Style::new();
        style.set_property(DIRECT_MANIPULATION, json!(true));
        style.set_transform([1., 0., 0., 1., 20., 30.]);
        style.set_property(
            BACKGROUND_IMAGE_ASSET,
            AssetRef::new("3fa9c0", "png"),
        );

        let text = style.to_text();
        assert!(text.contains("-cards-transform: [1.0,0.0,0.0,1.0,20.0,30.0];"));
        assert!(text.contains("-cards-background-image-asset: 3fa9c0.png;"));

        let parsed = Style::parse(&text).unwrap();
        assert_eq!(parsed, style);
        assert_eq!(
            parsed.background_asset(),
            Some(&AssetRef::new("3fa9c0", "png"))
        );
        assert_eq!(parsed.transform_components(), [1., 0., 0., 1., 20., 30.]);
    }

    #[test]
    fn equality_ignores_order() {
        let mut a = Style::new();
        a.set_property("width", "1px");
        a.set_property("height", "2px");
        let mut b = Style::new();
        b.set_property("height", "2px");
        b.set_property("width", "1px");
        assert_eq!(a, b);
    }

    #[test]
    fn values_are_normalized_per_name() {
        let mut style = Style::new();
        style.set_property("-cards-label", "hello");
        style.set_property("opacity", json!(0.5));
        assert_eq!(
            style.property("-cards-label"),
            Some(&StyleValue::Json(json!("hello")))
        );
        assert_eq!(
            style.property("opacity"),
            Some(&StyleValue::Text("0.5".into()))
        );
    }

    #[test]
    fn transform_requires_direct_manipulation() {
        let mut style = Style::new();
        style.set_transform([2., 0., 0., 2., 5., 5.]);
        style.set_transform_origin("top left");
        assert_eq!(style.transform(), Matrix3::identity());
        assert_eq!(style.transform_origin(), "");

        style.set_property(DIRECT_MANIPULATION, json!(true));
        assert_eq!(style.transform(), Matrix3::new(2., 0., 0., 0., 2., 0., 5., 5., 1.));
        assert_eq!(style.transform_origin(), "top left");
    }

    #[test]
    fn parse_stops_at_first_non_declaration() {
        let style = Style::parse("color: red;\n.x { color: blue; }\nwidth: 3px;").unwrap();
        assert_eq!(style.len(), 1);
        assert_eq!(style.classes(), Some(".x { color: blue; }\nwidth: 3px;"));
    }

    #[test]
    fn plain_values_are_stored_as_written_out() {
        let mut style = Style::new();
        style.set_property("font-family", " serif\t");
        style.set_property("content", "");
        style.set_property("grid-template-areas", "\"a b\"\n\"c d\"");
        style.set_property("background", "url(x.png); ");
        style.set_classes(Some("  \n".into()));

        assert_eq!(style.property("font-family"), Some(&StyleValue::Text("serif".into())));
        assert_eq!(style.property("content"), None);
        assert_eq!(style.classes(), None);
        assert_eq!(Style::parse(&style.to_text()).unwrap(), style);

        // clearing an existing value removes it
        style.set_property("font-family", "  ");
        assert_eq!(style.property("font-family"), None);
        assert_eq!(style.len(), 2);
    }

    fn property_name() -> impl Strategy<Value = String> {
        "[a-z][a-z-]{0,10}"
    }

    fn class_block() -> impl Strategy<Value = Option<String>> {
        proptest::option::of("\\.[a-z]{1,6} \\{\n  [a-z]{1,6}: [^\n{}]{0,8};\n\\}")
    }

    proptest! {
        #[test]
        fn plain_stores_survive_text(
            properties in proptest::collection::vec((property_name(), "\\PC{0,16}"), 0..8),
            classes in class_block(),
        ) {
            let mut style = Style::new();
            for (name, value) in &properties {
                style.set_property(name, value.as_str());
            }
            style.set_classes(classes);

            let text = style.to_text();
            prop_assert_eq!(Style::parse(&text).unwrap(), style);
        }
    }

    #[test]
    fn bad_structured_value_is_an_error() {
        assert!(matches!(
            Style::parse("-cards-transform: [1, 2;"),
            Err(StyleError::Json { .. })
        ));
        assert!(matches!(
            Style::parse("-cards-background-image-asset: nodot;"),
            Err(StyleError::BadAsset(_))
        ));
    }

    #[test]
    fn transform_text() {
        assert_eq!(
            parse_transform("1, 0, 0, 1, 10, 20").unwrap(),
            [1., 0., 0., 1., 10., 20.]
        );
        assert!(parse_transform("1, 0").is_err());
        assert!(parse_transform("a,b,c,d,e,f").is_err());
    }
}
