//! OAuth callback detection.
//!
//! After the identity provider completes sign-in it redirects back with
//! tokens or an authorization code in the URL fragment or query. While such
//! a URL is being processed the provider may not have persisted the session
//! yet, which is why the controller retries the session fetch for it.

use url::Url;

const CALLBACK_PARAMS: [&str; 3] = ["access_token", "refresh_token", "code"];

/// Parameters carried by an OAuth callback URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pairs: Vec<(String, String)>,
}

impl CallbackParams {
    /// Collects the fragment and query parameters of a URL.
    ///
    /// Fragment parameters come first, so they win on lookup.
    #[must_use]
    pub fn from_url(url: &Url) -> Self {
        let mut pairs = Vec::new();
        if let Some(fragment) = url.fragment() {
            pairs.extend(
                url::form_urlencoded::parse(fragment.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned())),
            );
        }
        pairs.extend(
            url.query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned())),
        );
        Self { pairs }
    }

    /// Parses a location string. Returns `None` if it is not a URL.
    #[must_use]
    pub fn parse(location: &str) -> Option<Self> {
        Url::parse(location).ok().map(|url| Self::from_url(&url))
    }

    /// Returns the first non-empty value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, v)| k == key && !v.is_empty())
            .map(|(_, v)| v.as_str())
    }

    /// Returns true if any callback signature parameter is present.
    #[must_use]
    pub fn is_callback(&self) -> bool {
        CALLBACK_PARAMS.iter().any(|key| self.get(key).is_some())
    }
}

/// Returns true if the location looks like an OAuth callback.
#[must_use]
pub fn is_oauth_callback(location: &str) -> bool {
    CallbackParams::parse(location).is_some_and(|params| params.is_callback())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_location_is_not_a_callback() {
        assert!(!is_oauth_callback("https://blog.example.com/admin"));
        assert!(!is_oauth_callback("https://blog.example.com/admin?tab=posts#top"));
    }

    #[test]
    fn implicit_flow_fragment_is_a_callback() {
        assert!(is_oauth_callback(
            "https://blog.example.com/admin#access_token=abc&expires_in=3600&refresh_token=def"
        ));
        assert!(is_oauth_callback(
            "https://blog.example.com/admin#refresh_token=def"
        ));
    }

    #[test]
    fn pkce_code_in_query_is_a_callback() {
        assert!(is_oauth_callback("https://blog.example.com/admin?code=xyz"));
        assert!(is_oauth_callback("https://blog.example.com/admin?next=1&code=xyz"));
    }

    #[test]
    fn empty_values_do_not_count() {
        assert!(!is_oauth_callback("https://blog.example.com/admin#access_token="));
    }

    #[test]
    fn similar_names_do_not_count() {
        assert!(!is_oauth_callback("https://blog.example.com/admin?zipcode=123"));
    }

    #[test]
    fn unparseable_location_is_not_a_callback() {
        assert!(!is_oauth_callback("not a url"));
    }

    #[test]
    fn fragment_values_win() {
        let params = CallbackParams::parse(
            "https://blog.example.com/admin?access_token=query#access_token=fragment",
        )
        .expect("valid url");
        assert_eq!(params.get("access_token"), Some("fragment"));
    }

    #[test]
    fn values_are_percent_decoded() {
        let params = CallbackParams::parse(
            "https://blog.example.com/admin#error_description=Email+not%20confirmed",
        )
        .expect("valid url");
        assert_eq!(params.get("error_description"), Some("Email not confirmed"));
    }
}
