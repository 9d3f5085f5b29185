use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Length of an issued token
const TOKEN_LEN: usize = 64;

/// Server-side store of single-use upload tokens
///
/// A token authorizes one upload within its lifetime. Consuming it
/// removes it from the store, so a replayed token fails no matter how
/// quickly it comes back.
pub struct CsrfTokens {
    ttl: Duration,
    tokens: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl CsrfTokens {
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::hours(1)),
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Mint a fresh single-use token
    pub async fn issue(&self) -> String {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LEN)
            .map(char::from)
            .collect();

        let mut tokens = self.tokens.lock().await;
        Self::sweep(&mut tokens, self.ttl);
        tokens.insert(token.clone(), Utc::now());
        token
    }

    /// Consume a token; true only on its first unexpired use
    pub async fn consume(&self, token: &str) -> bool {
        let mut tokens = self.tokens.lock().await;
        Self::sweep(&mut tokens, self.ttl);
        tokens.remove(token).is_some()
    }

    fn sweep(tokens: &mut HashMap<String, DateTime<Utc>>, ttl: Duration) {
        let now = Utc::now();
        tokens.retain(|_, minted| now - *minted <= ttl);
    }
}
