//! Request extractors that reject with the JSON error body

use axum::extract::{FromRequest, FromRequestParts};

use crate::api::responses::ApiError;

/// `axum::Json` whose rejection is an [`ApiError`]
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// `axum::extract::Query` whose rejection is an [`ApiError`]
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);
