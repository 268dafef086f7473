use axum::http::{HeaderName, HeaderValue};
use chrono::Utc;
use headers::Header;
use lazy_static::lazy_static;

lazy_static! {
    pub static ref TEST_NOW_HEADER_NAME: HeaderName = HeaderName::from_static("x-test-now-ms");
}

/// Current wall clock time in milliseconds since the unix epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Client supplied "current time", in milliseconds since the unix epoch.
/// Only honored when the server runs in test mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TestNow(pub i64);

impl Header for TestNow {
    fn name() -> &'static HeaderName {
        &*TEST_NOW_HEADER_NAME
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        Self: Sized,
        I: Iterator<Item = &'i HeaderValue>,
    {
        values
            .next()
            .ok_or_else(headers::Error::invalid)?
            .to_str()
            .ok()
            .and_then(|value| value.trim().parse().ok())
            .map(Self)
            .ok_or_else(headers::Error::invalid)
    }

    fn encode<E: Extend<HeaderValue>>(&self, container: &mut E) {
        container.extend(std::iter::once(HeaderValue::from(self.0)));
    }
}

/// Resolves the time a request should be evaluated at.
pub fn request_now(test_mode: bool, header: Option<TestNow>) -> i64 {
    match header {
        Some(TestNow(now)) if test_mode => now,
        _ => now_millis(),
    }
}
