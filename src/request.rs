use std::{collections::BTreeMap, fmt, pin::Pin, sync::Mutex};

use bytes::Bytes;
use futures::Stream;
use http::{header::COOKIE, HeaderMap, HeaderName, HeaderValue, Method, Uri};

use crate::{
    balancer::LoadBalancer,
    errors::{BoxError, RewriteError},
    instance::{InstanceAddress, ServiceInstance},
};

/// Single-pass stream of body chunks.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send>>;

/// Request payload.
///
/// `Empty` and `Full` can be forked into any number of independent handles, one per
/// hedged attempt. A `Stream` can only be drained once, so requests carrying one
/// cannot be hedged.
#[derive(Default)]
pub enum Body {
    #[default]
    Empty,
    Full(Bytes),
    Stream(Mutex<BodyStream>),
}

impl Body {
    /// Wraps a single-pass stream of chunks.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, BoxError>> + Send + 'static,
    {
        Body::Stream(Mutex::new(Box::pin(stream)))
    }

    /// Returns an independent handle over the same payload, or `None` for streams.
    pub fn fork(&self) -> Option<Body> {
        match self {
            Body::Empty => Some(Body::Empty),
            Body::Full(bytes) => Some(Body::Full(bytes.clone())),
            Body::Stream(_) => None,
        }
    }

    pub fn is_replayable(&self) -> bool {
        !matches!(self, Body::Stream(_))
    }

    /// Buffered payload, if any.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Body::Full(bytes) => Some(bytes),
            _ => None,
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Empty"),
            Body::Full(bytes) => f.debug_tuple("Full").field(&bytes.len()).finish(),
            Body::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Full(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Full(Bytes::from(bytes))
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Full(Bytes::from(text))
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Body::Full(Bytes::from_static(text.as_bytes()))
    }
}

/// Request addressed to a logical service rather than to a concrete replica.
///
/// The URI host names the service (`http://orders/v1/items?id=7` targets `orders`).
/// Built with the chained setters below; the hedging client only ever reads it.
#[derive(Debug)]
pub struct LogicalRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    cookies: Vec<(String, String)>,
    attributes: BTreeMap<String, String>,
    body: Body,
}

impl LogicalRequest {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            cookies: Vec::new(),
            attributes: BTreeMap::new(),
            body: Body::Empty,
        }
    }

    /// Shorthand for a `GET` of `uri`.
    pub fn get(uri: &str) -> Result<Self, http::uri::InvalidUri> {
        Ok(Self::new(Method::GET, uri.parse()?))
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    /// Attaches an opaque attribute. Attributes travel with every physical request but
    /// are never put on the wire by the bundled transport.
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn cookies(&self) -> &[(String, String)] {
        &self.cookies
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub fn payload(&self) -> &Body {
        &self.body
    }

    /// Logical service name, taken from the URI host.
    pub fn service_name(&self) -> Option<&str> {
        self.uri.host().filter(|host| !host.is_empty())
    }
}

/// A logical request bound to one concrete instance, ready for the transport.
#[derive(Debug)]
pub struct PhysicalRequest {
    pub instance: InstanceAddress,
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub cookies: Vec<(String, String)>,
    pub attributes: BTreeMap<String, String>,
    pub body: Body,
}

impl PhysicalRequest {
    /// Renders the cookies as a single `Cookie` header value.
    pub fn cookie_header(&self) -> Option<HeaderValue> {
        if self.cookies.is_empty() {
            return None;
        }
        let joined = self
            .cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        HeaderValue::from_str(&joined).ok()
    }

    /// Headers with the cookies folded in, as they go on the wire.
    pub fn wire_headers(&self) -> HeaderMap {
        let mut headers = self.headers.clone();
        if let Some(cookie) = self.cookie_header() {
            headers.append(COOKIE, cookie);
        }
        headers
    }
}

/// Rewrites `logical` so it targets `instance`.
///
/// Path and query are preserved; scheme and authority come from the instance as
/// resolved by the balancer. Method, headers, cookies and attributes are copied and the
/// body is forked so every attempt drains its own handle.
pub fn rewrite<L>(
    logical: &LogicalRequest,
    instance: &ServiceInstance,
    balancer: &L,
) -> Result<PhysicalRequest, RewriteError>
where
    L: LoadBalancer + ?Sized,
{
    let uri = balancer.reconstruct_uri(instance, &logical.uri)?;
    let body = logical.body.fork().ok_or(RewriteError::UnreplayableBody)?;

    Ok(PhysicalRequest {
        instance: instance.address(),
        method: logical.method.clone(),
        uri,
        headers: logical.headers.clone(),
        cookies: logical.cookies.clone(),
        attributes: logical.attributes.clone(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use futures::stream;
    use http::header::{ACCEPT, CONTENT_TYPE};

    use super::*;
    use crate::balancer::RoundRobin;
    use crate::discovery::StaticDiscovery;

    fn balancer() -> RoundRobin<StaticDiscovery> {
        RoundRobin::new(StaticDiscovery::default())
    }

    fn post() -> LogicalRequest {
        LogicalRequest::new(Method::POST, "http://orders/v1/items?id=7".parse().unwrap())
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .cookie("session", "abc")
            .cookie("theme", "dark")
            .attribute("trace", "on")
            .body(r#"{"qty":2}"#)
    }

    #[test]
    fn rewrite_targets_instance_and_keeps_everything_else() {
        let logical = post();
        let instance = ServiceInstance::new("orders", "http", "10.0.0.5", 9090);

        let physical = rewrite(&logical, &instance, &balancer()).unwrap();

        assert_eq!(physical.uri.to_string(), "http://10.0.0.5:9090/v1/items?id=7");
        assert_eq!(physical.instance.as_str(), "http://10.0.0.5:9090");
        assert_eq!(physical.method, Method::POST);
        assert_eq!(physical.headers, *logical.headers());
        assert_eq!(physical.cookies, logical.cookies());
        assert_eq!(physical.attributes.get("trace").map(String::as_str), Some("on"));
        assert_eq!(physical.body.as_bytes().unwrap().as_ref(), br#"{"qty":2}"#);
    }

    #[test]
    fn forked_bodies_are_independent() {
        let logical = post();
        let a = rewrite(
            &logical,
            &ServiceInstance::new("orders", "http", "a", 80),
            &balancer(),
        )
        .unwrap();
        let b = rewrite(
            &logical,
            &ServiceInstance::new("orders", "http", "b", 80),
            &balancer(),
        )
        .unwrap();

        drop(a);
        assert_eq!(b.body.as_bytes().unwrap().as_ref(), br#"{"qty":2}"#);
        assert!(logical.payload().is_replayable());
    }

    #[test]
    fn stream_body_cannot_be_rewritten() {
        let chunks = stream::iter(vec![Ok::<_, BoxError>(Bytes::from_static(b"x"))]);
        let logical = LogicalRequest::new(Method::PUT, "http://orders/upload".parse().unwrap())
            .body(Body::from_stream(chunks));

        let err = rewrite(
            &logical,
            &ServiceInstance::new("orders", "http", "a", 80),
            &balancer(),
        )
        .unwrap_err();

        assert_eq!(err, RewriteError::UnreplayableBody);
    }

    #[test]
    fn malformed_host_is_an_invalid_address() {
        let logical = LogicalRequest::get("http://orders/").unwrap();
        let instance = ServiceInstance::new("orders", "http", "bad host", 80);

        let err = rewrite(&logical, &instance, &balancer()).unwrap_err();

        assert!(matches!(err, RewriteError::InvalidInstanceAddress { .. }));
    }

    #[test]
    fn cookies_fold_into_a_single_header() {
        let physical = rewrite(
            &post(),
            &ServiceInstance::new("orders", "http", "a", 80),
            &balancer(),
        )
        .unwrap();

        let headers = physical.wire_headers();
        assert_eq!(headers.get(COOKIE).unwrap(), "session=abc; theme=dark");
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
    }

    #[test]
    fn service_name_is_the_uri_host() {
        assert_eq!(
            LogicalRequest::get("http://service/hi").unwrap().service_name(),
            Some("service")
        );
        assert_eq!(LogicalRequest::get("/hi").unwrap().service_name(), None);
    }
}
