use std::fmt;
use tracing::{field, warn, Span};

pub(crate) trait Record: Sized {
  fn record_field(self, field: &'static str) -> Self;

  #[inline]
  fn record_request(self) -> Self {
    self.record_field("request")
  }

  #[inline]
  fn record_response(self) -> Self {
    self.record_field("response")
  }
}

impl<T: fmt::Debug> Record for T {
  #[inline]
  fn record_field(self, field: &'static str) -> Self {
    Span::current().record(field, &field::debug(&self));
    self
  }
}

#[inline]
pub(crate) fn record_request<T: fmt::Debug>(request: T) -> T {
  request.record_request()
}

/// Errors are always logged, whatever the span filter says about requests.
pub(crate) fn record_error<T, E: fmt::Display>(result: Result<T, E>) -> Result<T, E> {
  if let Err(e) = &result {
    warn!(error = %e, "request failed");
  }

  result
}
