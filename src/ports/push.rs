/// One encrypted message ready to be POSTed to a push service.
#[derive(Debug, Clone)]
pub struct PushRequest {
    pub endpoint: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Vec<u8>,
}

impl PushRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct PushResponse {
    pub status: u16,
    pub body: String,
}

pub trait PushTransport: Clone + Send + Sync + 'static {
    type Error: std::fmt::Display + Send + Sync + 'static;
    type Fut<'a>: Future<Output = Result<PushResponse, Self::Error>> + Send + 'a
    where
        Self: 'a;

    fn post<'a>(&'a self, request: &'a PushRequest) -> Self::Fut<'a>;
}
