/// Cookies lifted from the authenticated browser tab.
///
/// Page images in the reader are access controlled, so every download has to
/// carry the same cookies the browser holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    cookies: Vec<(String, String)>,
}

impl Session {

    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let cookies = pairs
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .collect();

        Self { cookies }
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Value for a `Cookie` request header, `None` when there is nothing to send.
    pub fn cookie_header(&self) -> Option<String> {

        if self.cookies.is_empty() {return None;}

        let header = self.cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ");

        Some(header)
    }
}
