//! Built-in field directives.
//!
//! Each factory validates its field once, at build time, and returns the
//! binder that runs per request. Type checks go through the field's
//! [`Shape`](crate::value::Shape), so every mismatch is reported before the
//! server starts.

use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{ApiError, DirectiveError};
use crate::form::{FORM_URLENCODED, FormValues, MULTIPART_FORM_DATA};
use crate::method::Method;
use crate::registry::{BindFn, FieldDescription, FieldTarget, Registry, bind_fn};
use crate::request::Request;
use crate::route::{Parameter, RouteInfo};
use crate::value::{FieldKind, Wrapper, parse_value};

pub(crate) fn install(registry: &mut Registry) {
    registry
        .register("body", body)
        .register("doc", doc)
        .register("header", header)
        .register("httpmethod", http_method)
        .register("httppath", http_path)
        .register("httprequest", http_request)
        .register("notes", notes)
        .register("path", path)
        .register("produces", produces)
        .register("query", query)
        .register("request", request);
}

type FactoryResult = Result<Option<BindFn>, DirectiveError>;

// ── Checks ───────────────────────────────────────────────────────────────────

fn require_value(arg: &str) -> Result<(), DirectiveError> {
    if arg.is_empty() {
        Err(DirectiveError::MissingValue)
    } else {
        Ok(())
    }
}

fn forbid_value(arg: &str) -> Result<(), DirectiveError> {
    if arg.is_empty() {
        Ok(())
    } else {
        Err(DirectiveError::UnexpectedValue(arg.to_owned()))
    }
}

fn require_text(field: &FieldDescription) -> Result<(), DirectiveError> {
    if field.shape.is_plain_text() {
        Ok(())
    } else {
        Err(DirectiveError::BadType { expected: "String", found: field.type_name })
    }
}

fn require_parseable(field: &FieldDescription) -> Result<(), DirectiveError> {
    if field.shape.is_parseable() && field.shape.wrapper != Wrapper::Vec {
        Ok(())
    } else {
        Err(DirectiveError::BadType { expected: "a single parseable value", found: field.type_name })
    }
}

/// Writes a fixed string into a `String` field.
fn write_text(target: &mut FieldTarget<'_>, text: &str) -> Result<(), ApiError> {
    text.clone_into(target.downcast_mut::<String>()?);
    Ok(())
}

// ── Route shape ──────────────────────────────────────────────────────────────

fn http_method(arg: &str, field: &FieldDescription, info: &mut RouteInfo) -> FactoryResult {
    require_value(arg)?;
    require_text(field)?;
    info.method = Some(Method::from_str(arg)?);
    Ok(Some(bind_fn(|target, req| write_text(target, req.method().as_str()))))
}

fn http_path(arg: &str, field: &FieldDescription, info: &mut RouteInfo) -> FactoryResult {
    require_value(arg)?;
    require_text(field)?;
    arg.clone_into(&mut info.path);
    Ok(Some(bind_fn(|target, req| write_text(target, req.path()))))
}

fn doc(arg: &str, field: &FieldDescription, info: &mut RouteInfo) -> FactoryResult {
    forbid_value(arg)?;
    require_text(field)?;
    let text: Arc<str> = field.description().into();
    info.doc = text.to_string();
    Ok(Some(bind_fn(move |target, _| write_text(target, &text))))
}

fn notes(arg: &str, field: &FieldDescription, info: &mut RouteInfo) -> FactoryResult {
    forbid_value(arg)?;
    require_text(field)?;
    let text: Arc<str> = field.description().into();
    info.notes = text.to_string();
    Ok(Some(bind_fn(move |target, _| write_text(target, &text))))
}

fn produces(arg: &str, field: &FieldDescription, info: &mut RouteInfo) -> FactoryResult {
    require_value(arg)?;
    require_text(field)?;
    info.produces.push(arg.to_owned());
    let mime: Arc<str> = arg.into();
    Ok(Some(bind_fn(move |target, _| write_text(target, &mime))))
}

// ── Parameters ───────────────────────────────────────────────────────────────

fn path(arg: &str, field: &FieldDescription, info: &mut RouteInfo) -> FactoryResult {
    require_value(arg)?;
    require_parseable(field)?;
    if info.path_parameters.iter().any(|p| p.name == arg) {
        return Err(DirectiveError::Duplicate { kind: "path", name: arg.to_owned() });
    }
    info.path_parameters.push(Parameter::new(&field.name, arg, field.description(), false));

    let name = arg.to_owned();
    Ok(Some(bind_fn(move |target, req| {
        let token = req.param(&name).unwrap_or_default();
        parse_value(token, target.value()?).map_err(|e| ApiError::path_parameter(&name, e))?;
        debug!(parameter = %name, token, "bound path parameter");
        Ok(())
    })))
}

fn header(arg: &str, field: &FieldDescription, info: &mut RouteInfo) -> FactoryResult {
    require_value(arg)?;
    require_parseable(field)?;
    if info.header_parameters.iter().any(|p| p.name.eq_ignore_ascii_case(arg)) {
        return Err(DirectiveError::Duplicate { kind: "header", name: arg.to_owned() });
    }
    info.header_parameters.push(Parameter::new(&field.name, arg, field.description(), false));

    let name = arg.to_owned();
    Ok(Some(bind_fn(move |target, req| {
        let token = match req.headers().get(name.as_str()) {
            Some(value) => value.to_str().map_err(|e| ApiError::header_parameter(&name, e))?,
            None => "",
        };
        parse_value(token, target.value()?).map_err(|e| ApiError::header_parameter(&name, e))?;
        debug!(header = %name, token, "bound header");
        Ok(())
    })))
}

fn query(arg: &str, field: &FieldDescription, info: &mut RouteInfo) -> FactoryResult {
    require_value(arg)?;
    let multiple = field.shape.is_sequence();
    if !field.shape.is_parseable() {
        return Err(DirectiveError::BadType { expected: "a parseable value or sequence", found: field.type_name });
    }

    let names: Vec<String> = arg.split(',').map(|n| n.trim().to_owned()).collect();
    if let Some(dup) = names.iter().enumerate().find_map(|(i, n)| {
        let taken = info.query_parameters.iter().any(|p| &p.name == n) || names[..i].contains(n);
        taken.then_some(n)
    }) {
        return Err(DirectiveError::Duplicate { kind: "query", name: dup.clone() });
    }

    let canonical = names[0].clone();
    info.query_parameters.push(Parameter::new(&field.name, &canonical, field.description(), multiple));
    for alias in &names[1..] {
        let note = format!("Deprecated; use {canonical:?} instead.");
        info.query_parameters.push(Parameter::new(&field.name, alias, &note, multiple));
    }

    let default = field.attribute("default").map(str::to_owned);
    Ok(Some(bind_fn(move |target, req| {
        let (name, values) = names
            .iter()
            .find_map(|n| {
                let values = req.query_values(n);
                (!values.is_empty()).then(|| (n.as_str(), values.to_vec()))
            })
            .or_else(|| default.clone().map(|d| (canonical.as_str(), vec![d])))
            .unwrap_or((canonical.as_str(), Vec::new()));

        let value = target.value()?;
        if multiple {
            value.parse_each(&values).map_err(|e| ApiError::query_parameter(name, e))?;
        } else if let Some(first) = values.first() {
            if values.len() > 1 {
                warn!(parameter = name, ?values, "multiple values given for single query parameter");
            }
            parse_value(first, value).map_err(|e| ApiError::query_parameter(name, e))?;
        } else {
            return Ok(());
        }
        debug!(parameter = name, ?values, "bound query parameter");
        Ok(())
    })))
}

// ── Body ─────────────────────────────────────────────────────────────────────

fn body(arg: &str, field: &FieldDescription, info: &mut RouteInfo) -> FactoryResult {
    let mut consumes = Vec::new();
    let mut allow_empty = false;

    if !arg.is_empty() {
        for option in arg.split(';') {
            let (key, value) = option.split_once(':').unwrap_or((option, ""));
            match key {
                "consumes" => consumes.extend(value.split(',').map(|v| v.trim().to_owned())),
                "empty" if value.is_empty() => allow_empty = true,
                "empty" => return Err(DirectiveError::InvalidOption(format!("empty:{value}"))),
                other => return Err(DirectiveError::InvalidOption(other.to_owned())),
            }
        }
    }

    let kind = field.shape.kind;
    if consumes.is_empty() {
        match kind {
            FieldKind::Form => consumes.push(FORM_URLENCODED.to_owned()),
            FieldKind::Multipart => consumes.push(MULTIPART_FORM_DATA.to_owned()),
            _ => {}
        }
    }
    for (content_type, expected) in [(FORM_URLENCODED, FieldKind::Form), (MULTIPART_FORM_DATA, FieldKind::Multipart)] {
        if consumes.iter().any(|c| c == content_type) && kind != expected {
            return Err(DirectiveError::ContentType { content_type: content_type.to_owned(), found: field.type_name });
        }
    }
    let readable = matches!(
        kind,
        FieldKind::Text | FieldKind::Bytes | FieldKind::Form | FieldKind::Multipart | FieldKind::Structured
    );
    if !readable || field.shape.wrapper == Wrapper::Vec {
        return Err(DirectiveError::BadType { expected: "a body type", found: field.type_name });
    }

    if !allow_empty {
        info.body_example = field.example.clone();
    }
    info.consumes = consumes;

    let content_type = info.consumes.first().cloned().unwrap_or_default();
    Ok(Some(bind_fn(move |target, req| {
        if allow_empty && req.body().is_empty() {
            return Ok(());
        }
        debug!(content_type = %content_type, length = req.body().len(), "binding body");
        match content_type.as_str() {
            FORM_URLENCODED => inject(target, FormValues::parse(req.body())),
            MULTIPART_FORM_DATA => match req.multipart() {
                Some(Ok(form)) => inject(target, form.clone()),
                Some(Err(e)) => Err(ApiError::body(e.clone())),
                None => Err(ApiError::internal("multipart body was not decoded")),
            },
            _ => target.value()?.read_body(req.body()).map_err(ApiError::body),
        }
    })))
}

/// Stores a decoded container into a `T` or `Option<T>` field.
fn inject<T: Send + 'static>(target: &mut FieldTarget<'_>, decoded: T) -> Result<(), ApiError> {
    let name = target.name().to_owned();
    let value = target.value()?.as_any_mut();
    if let Some(slot) = value.downcast_mut::<T>() {
        *slot = decoded;
        return Ok(());
    }
    match value.downcast_mut::<Option<T>>() {
        Some(slot) => {
            *slot = Some(decoded);
            Ok(())
        }
        None => Err(ApiError::internal(format!("field {name:?} cannot hold the decoded body"))),
    }
}

// ── Request handles ──────────────────────────────────────────────────────────

fn http_request(arg: &str, field: &FieldDescription, _: &mut RouteInfo) -> FactoryResult {
    forbid_value(arg)?;
    if field.shape.kind != FieldKind::RawRequest {
        return Err(DirectiveError::BadType { expected: "http::Request<Bytes>", found: field.type_name });
    }
    Ok(Some(bind_fn(|target, req| inject(target, req.to_http()))))
}

fn request(arg: &str, field: &FieldDescription, _: &mut RouteInfo) -> FactoryResult {
    forbid_value(arg)?;
    if field.shape.kind != FieldKind::Request {
        return Err(DirectiveError::BadType { expected: "Request", found: field.type_name });
    }
    Ok(Some(bind_fn(|target, req: &Request| inject(target, req.clone()))))
}

#[cfg(test)]
mod tests {
    use std::any::Any;
    use std::collections::{BTreeMap, HashMap};

    use bytes::Bytes;

    use super::*;
    use crate::form::MultipartForm;
    use crate::registry::{ErasedAccessor, erased_accessor};
    use crate::value::{FieldValue, Shape};

    fn describe<T: FieldValue + Default>(name: &str, attributes: &[(&str, &str)]) -> FieldDescription {
        let probe = T::default();
        FieldDescription {
            name: name.to_owned(),
            shape: probe.shape(),
            type_name: probe.type_name(),
            example: probe.example(),
            attributes: attributes.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect::<BTreeMap<_, _>>(),
            marker: false,
        }
    }

    fn whole<T: FieldValue + 'static>() -> ErasedAccessor {
        erased_accessor(|r: &mut dyn Any| r.downcast_mut::<T>().map(|v| v as &mut dyn FieldValue))
    }

    fn request(uri: &str, params: &[(&str, &str)]) -> Request {
        let req = http::Request::builder().uri(uri).body(Bytes::new()).unwrap();
        let params = params.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect::<HashMap<_, _>>();
        Request::new(req, params)
    }

    /// Runs a binder against a standalone value of type `T`.
    fn bind<T: FieldValue + Default + 'static>(bind: &BindFn, req: &Request) -> Result<T, ApiError> {
        let accessor = whole::<T>();
        let mut value = T::default();
        let mut target = FieldTarget::new(&mut value, &accessor, "field");
        bind(&mut target, req)?;
        Ok(value)
    }

    #[test]
    fn query_aliases_are_documented_as_deprecated() {
        let mut info = RouteInfo::default();
        query("limit, max", &describe::<u32>("Limit", &[("description", "page size")]), &mut info).unwrap();
        let names: Vec<_> = info.query_parameters.iter().map(|p| (p.name.as_str(), p.description.as_str())).collect();
        assert_eq!(names, [("limit", "page size"), ("max", r#"Deprecated; use "limit" instead."#)]);
    }

    #[test]
    fn query_prefers_the_first_name_with_a_value() {
        let mut info = RouteInfo::default();
        let binder = query("limit,max", &describe::<u32>("Limit", &[]), &mut info).unwrap().unwrap();
        assert_eq!(bind::<u32>(&binder, &request("/?max=5", &[])).unwrap(), 5);
        assert_eq!(bind::<u32>(&binder, &request("/?max=5&limit=3", &[])).unwrap(), 3);
        assert_eq!(bind::<u32>(&binder, &request("/", &[])).unwrap(), 0);
    }

    #[test]
    fn query_falls_back_to_the_default_attribute() {
        let mut info = RouteInfo::default();
        let binder = query("limit", &describe::<u32>("Limit", &[("default", "25")]), &mut info).unwrap().unwrap();
        assert_eq!(bind::<u32>(&binder, &request("/", &[])).unwrap(), 25);
    }

    #[test]
    fn query_sequences_take_every_value() {
        let mut info = RouteInfo::default();
        let binder = query("tag", &describe::<Vec<i32>>("Tags", &[]), &mut info).unwrap().unwrap();
        assert!(info.query_parameters[0].allow_multiple);
        assert_eq!(bind::<Vec<i32>>(&binder, &request("/?tag=1&tag=2", &[])).unwrap(), vec![1, 2]);
        let err = bind::<Vec<i32>>(&binder, &request("/?tag=x", &[])).unwrap_err();
        assert_eq!(err.parameter(), Some("tag"));
    }

    #[test]
    fn duplicate_query_names_fail() {
        let mut info = RouteInfo::default();
        query("a", &describe::<u32>("A", &[]), &mut info).unwrap();
        let err = query("b,a", &describe::<u32>("B", &[]), &mut info).err().unwrap();
        assert!(matches!(err, DirectiveError::Duplicate { kind: "query", .. }));
        assert!(query("c,c", &describe::<u32>("C", &[]), &mut info).is_err());
    }

    #[test]
    fn path_parse_failures_name_the_parameter() {
        let mut info = RouteInfo::default();
        let binder = path("id", &describe::<i64>("ID", &[]), &mut info).unwrap().unwrap();
        assert_eq!(bind::<i64>(&binder, &request("/x/42", &[("id", "42")])).unwrap(), 42);
        let err = bind::<i64>(&binder, &request("/x/bogus", &[("id", "bogus")])).unwrap_err();
        assert_eq!(err.parameter(), Some("id"));
        assert!(path("id", &describe::<i64>("Other", &[]), &mut info).is_err());
    }

    #[test]
    fn scalar_directives_reject_structured_fields() {
        let mut info = RouteInfo::default();
        let err = path("id", &describe::<serde_json::Value>("ID", &[]), &mut info).err().unwrap();
        assert!(matches!(err, DirectiveError::BadType { .. }));
        assert!(http_method("GET", &describe::<u32>("M", &[]), &mut info).is_err());
        assert!(http_method("FETCH", &describe::<String>("M", &[]), &mut info).is_err());
        assert!(doc("x", &describe::<String>("Doc", &[]), &mut info).is_err());
    }

    #[test]
    fn body_options_are_validated() {
        let mut info = RouteInfo::default();
        let text = describe::<String>("Body", &[]);
        assert!(matches!(body("bogus", &text, &mut info), Err(DirectiveError::InvalidOption(_))));
        assert!(matches!(body("empty:yes", &text, &mut info), Err(DirectiveError::InvalidOption(_))));
        assert!(matches!(
            body(&format!("consumes:{FORM_URLENCODED}"), &text, &mut info),
            Err(DirectiveError::ContentType { .. })
        ));
        body("consumes:text/plain, text/csv;empty", &text, &mut info).unwrap();
        assert_eq!(info.consumes, ["text/plain", "text/csv"]);
        assert_eq!(info.body_example, None);
    }

    #[test]
    fn form_fields_default_their_content_type() {
        let mut info = RouteInfo::default();
        body("", &describe::<FormValues>("Form", &[]), &mut info).unwrap();
        assert_eq!(info.consumes, [FORM_URLENCODED]);
        body("", &describe::<Option<MultipartForm>>("Upload", &[]), &mut info).unwrap();
        assert_eq!(info.consumes, [MULTIPART_FORM_DATA]);
        assert_eq!(describe::<Option<MultipartForm>>("U", &[]).shape, Shape { kind: FieldKind::Multipart, wrapper: Wrapper::Option });
    }
}
