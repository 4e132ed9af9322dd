//! The process-wide registry. Kept in its own binary: building the first
//! route seals it for every test in the process.

mod common;

use std::panic::{AssertUnwindSafe, catch_unwind};

use bytes::Bytes;
use restbind::registry::{self, FieldTarget};
use restbind::{DirectiveError, FieldSpec, HttpGet, Metadata, Registrar, Router};

#[derive(Default)]
struct Whoami {
    get: HttpGet,
    tenant: String,
}

impl Metadata for Whoami {
    fn fields() -> Vec<FieldSpec<Self>> {
        vec![
            FieldSpec::embed("HttpGet", |m: &mut Self| &mut m.get),
            FieldSpec::marker("Path", "httppath:whoami"),
            FieldSpec::new("Tenant", |m: &mut Self| &mut m.tenant).api("tenant:x-tenant"),
        ]
    }
}

async fn whoami(m: Whoami) -> String {
    m.tenant
}

#[tokio::test]
async fn custom_directives_register_until_the_first_build() {
    common::init_tracing();

    registry::register("tenant", |arg, field, route| {
        if !field.shape.is_plain_text() {
            return Err(DirectiveError::BadType { expected: "String", found: field.type_name });
        }
        route.annotations.insert("tenant-header".to_owned(), arg.to_owned());
        let header = arg.to_owned();
        Ok(Some(registry::bind_fn(move |target: &mut FieldTarget<'_>, req| {
            let tenant = req.header(&header).unwrap_or("shared");
            tenant.clone_into(target.downcast_mut::<String>()?);
            Ok(())
        })))
    });

    let duplicate = catch_unwind(AssertUnwindSafe(|| registry::register("tenant", |_, _, _| Ok(None))));
    assert!(duplicate.is_err());
    let builtin = catch_unwind(AssertUnwindSafe(|| registry::register("query", |_, _, _| Ok(None))));
    assert!(builtin.is_err());

    let mut router = Router::new();
    Registrar::new("/").route(&mut router, "", whoami).unwrap();
    assert_eq!(router.routes().next().unwrap().annotations["tenant-header"], "x-tenant");

    let req = http::Request::get("/whoami").header("x-tenant", "acme").body(Bytes::new()).unwrap();
    assert_eq!(router.handle(req).await.body(), br#""acme""#);
    let req = http::Request::get("/whoami").body(Bytes::new()).unwrap();
    assert_eq!(router.handle(req).await.body(), br#""shared""#);

    // Registering while the table is being read must refuse, not wait.
    let held = registry::registry();
    let sealed = catch_unwind(AssertUnwindSafe(|| registry::register("late", |_, _, _| Ok(None))));
    drop(held);
    let message = sealed.unwrap_err();
    let message = message.downcast_ref::<String>().map(String::as_str).unwrap_or_default();
    assert!(message.contains("sealed"), "{message}");
    assert!(!registry::registry().contains("late"));
}
