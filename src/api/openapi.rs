use super::handlers::{attributes, health};
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Router that serves every documented endpoint and builds the `OpenAPI` document.
///
/// Handlers sharing a path must be registered in the same `routes!` call.
pub(crate) fn api_router() -> OpenApiRouter {
    let mut router = OpenApiRouter::with_openapi(package_openapi())
        .routes(routes!(health::health))
        .routes(routes!(attributes::list_attributes))
        .routes(routes!(attributes::pending_attributes))
        .routes(routes!(attributes::update_attribute))
        .routes(routes!(
            attributes::observe_verification,
            attributes::cancel_verification
        ))
        .routes(routes!(attributes::confirm_attribute))
        .routes(routes!(attributes::resend_code));

    let mut health_tag = Tag::new("health");
    health_tag.description = Some("Liveness and identity provider reachability".to_string());

    let mut attributes_tag = Tag::new("attributes");
    attributes_tag.description = Some("Attribute updates and code verification".to_string());

    router.get_openapi_mut().tags = Some(vec![health_tag, attributes_tag]);

    router
}

fn package_openapi() -> utoipa::openapi::OpenApi {
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(non_empty(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = package_contact(env!("CARGO_PKG_AUTHORS"));
    info.license = non_empty(env!("CARGO_PKG_LICENSE")).map(|id| {
        let mut license = License::new(id);
        license.identifier = Some(id.to_string());
        license
    });

    OpenApiBuilder::new().info(info).build()
}

// Authors look like "Name <email>;Other <email>"; only the first is published.
fn package_contact(authors: &str) -> Option<Contact> {
    let first = non_empty(authors.split(';').next()?)?;
    let (name, email) = match first.split_once('<') {
        Some((name, rest)) => (non_empty(name), non_empty(rest.trim_end_matches('>'))),
        None => (Some(first), None),
    };
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}
