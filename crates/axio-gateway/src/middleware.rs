//! Request-values middleware
//!
//! Seeds [`ContextValues`] so bridged callbacks can read the caller's name
//! from the context.

use std::collections::HashMap;

use axio_bridge::ContextValues;
use axum::{
    extract::{Query, Request},
    middleware::Next,
    response::Response,
};

/// Header carrying the user name
pub const USER_HEADER: &str = "x-user";

/// Query parameter used when the header is absent
pub const USER_QUERY: &str = "user";

/// Context key the user name is stored under
pub const USER_KEY: &str = "user";

/// Attach the caller's user name, when known, as a context value
pub async fn request_values(mut request: Request, next: Next) -> Response {
    let mut values = ContextValues::new();
    if let Some(user) = user_name(&request) {
        values.insert(USER_KEY, user);
    }
    request.extensions_mut().insert(values);

    next.run(request).await
}

fn user_name(request: &Request) -> Option<String> {
    let from_header = request
        .headers()
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string());

    from_header
        .or_else(|| {
            Query::<HashMap<String, String>>::try_from_uri(request.uri())
                .ok()
                .and_then(|Query(mut params)| params.remove(USER_QUERY))
        })
        .filter(|user| !user.is_empty())
}
