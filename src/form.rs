//! Form body containers.
//!
//! These are the only body types with content-type specific decoding: a
//! [`FormValues`] field reads `application/x-www-form-urlencoded`, a
//! [`MultipartForm`] field reads `multipart/form-data`.

use std::collections::BTreeMap;

use bytes::Bytes;
use futures::stream;
use serde::Serialize;

use crate::error::BoxError;
use crate::value::{FieldKind, FieldValue, Shape};

pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
pub const MULTIPART_FORM_DATA: &str = "multipart/form-data";

/// Upper bound on a multipart body held in memory.
const MULTIPART_MEMORY_LIMIT: u64 = 10 * 1000 * 1000;

// ── FormValues ────────────────────────────────────────────────────────────────

/// A string-keyed multi-value map, as decoded from a query string or a
/// URL-encoded body. Values keep their arrival order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FormValues(BTreeMap<String, Vec<String>>);

impl FormValues {
    /// Decodes `application/x-www-form-urlencoded` bytes.
    pub fn parse(input: &[u8]) -> Self {
        let mut values = Self::default();
        for (k, v) in url::form_urlencoded::parse(input) {
            values.append(k.into_owned(), v.into_owned());
        }
        values
    }

    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.entry(key.into()).or_default().push(value.into());
    }

    /// First value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.first()).map(String::as_str)
    }

    /// Every value for `key`, in order. Empty if absent.
    pub fn get_all(&self, key: &str) -> &[String] {
        self.0.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl FieldValue for FormValues {
    fn shape(&self) -> Shape {
        Shape::of(FieldKind::Form)
    }

    fn example(&self) -> Option<serde_json::Value> {
        Some(serde_json::Value::Object(serde_json::Map::new()))
    }
}

// ── MultipartForm ─────────────────────────────────────────────────────────────

/// One uploaded file from a multipart body.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilePart {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// A decoded `multipart/form-data` body.
///
/// Parts without a file name land in [`values`](MultipartForm::values); parts
/// with one land in [`files`](MultipartForm::files).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MultipartForm {
    pub values: FormValues,
    pub files: BTreeMap<String, Vec<FilePart>>,
}

impl MultipartForm {
    /// Decodes a buffered multipart body.
    ///
    /// `content_type` must carry the `boundary` parameter.
    pub async fn parse(content_type: &str, body: Bytes) -> Result<Self, BoxError> {
        let boundary = multer::parse_boundary(content_type)?;
        let constraints = multer::Constraints::new()
            .size_limit(multer::SizeLimit::new().whole_stream(MULTIPART_MEMORY_LIMIT));
        let chunks = stream::once(async move { Ok::<Bytes, std::io::Error>(body) });
        let mut multipart = multer::Multipart::with_constraints(chunks, boundary, constraints);

        let mut form = MultipartForm::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_owned();
            match field.file_name().map(str::to_owned) {
                Some(file_name) => {
                    let content_type = field.content_type().map(ToString::to_string);
                    let data = field.bytes().await?;
                    form.files.entry(name).or_default().push(FilePart {
                        file_name: Some(file_name),
                        content_type,
                        data,
                    });
                }
                None => {
                    let text = field.text().await?;
                    form.values.append(name, text);
                }
            }
        }
        Ok(form)
    }

    /// Files uploaded under `name`.
    pub fn files(&self, name: &str) -> &[FilePart] {
        self.files.get(name).map(Vec::as_slice).unwrap_or_default()
    }
}

impl FieldValue for MultipartForm {
    fn shape(&self) -> Shape {
        Shape::of(FieldKind::Multipart)
    }

    fn example(&self) -> Option<serde_json::Value> {
        Some(serde_json::Value::Object(serde_json::Map::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_values_keep_repeated_keys_in_order() {
        let form = FormValues::parse(b"a=1&b=x%20y&a=2");
        assert_eq!(form.get_all("a"), ["1", "2"]);
        assert_eq!(form.get("b"), Some("x y"));
        assert!(form.get_all("missing").is_empty());
    }

    #[tokio::test]
    async fn multipart_splits_values_and_files() {
        let body = concat!(
            "--XYZ\r\n",
            "Content-Disposition: form-data; name=\"title\"\r\n\r\n",
            "hello\r\n",
            "--XYZ\r\n",
            "Content-Disposition: form-data; name=\"upload\"; filename=\"a.txt\"\r\n",
            "Content-Type: text/plain\r\n\r\n",
            "file body\r\n",
            "--XYZ--\r\n",
        );
        let form = MultipartForm::parse("multipart/form-data; boundary=XYZ", Bytes::from(body)).await.unwrap();
        assert_eq!(form.values.get("title"), Some("hello"));
        let files = form.files("upload");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_name.as_deref(), Some("a.txt"));
        assert_eq!(files[0].data, Bytes::from_static(b"file body"));
    }

    #[tokio::test]
    async fn multipart_without_boundary_fails() {
        assert!(MultipartForm::parse("multipart/form-data", Bytes::new()).await.is_err());
    }
}
