use rand::seq::SliceRandom;
use rand::Rng;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:90.0) Gecko/20100101 Firefox/90.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 14_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.2 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Android 11; Mobile; rv:89.0) Gecko/89.0 Firefox/89.0",
];

const TIMEZONES: &[&str] = &[
    "America/New_York",
    "Europe/London",
    "Asia/Kolkata",
    "Australia/Sydney",
    "Africa/Johannesburg",
];

const WINDOW_SIZES: &[(u32, u32)] = &[
    (1920, 1080),
    (1366, 768),
    (1536, 864),
    (1280, 720),
    (1440, 900),
];

const LANGUAGES: &[&str] = &[
    "en-US", "es-ES", "fr-FR", "de-DE", "it-IT", "pt-BR", "ja-JP", "zh-CN", "ru-RU",
];

/// Identity presented by the browser for a whole session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrowserFingerprint {
    pub user_agent: String,
    pub language: String,
    pub timezone: String,
    pub window_size: (u32, u32),
}

impl Default for BrowserFingerprint {
    fn default() -> Self {
        Self {
            user_agent: USER_AGENTS[0].to_string(),
            language: LANGUAGES[0].to_string(),
            timezone: TIMEZONES[0].to_string(),
            window_size: WINDOW_SIZES[0],
        }
    }
}

impl BrowserFingerprint {
    pub fn random() -> Self {
        Self::random_with(&mut rand::thread_rng())
    }

    pub fn random_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let fallback = Self::default();
        Self {
            user_agent: USER_AGENTS
                .choose(&mut *rng)
                .map(|s| s.to_string())
                .unwrap_or(fallback.user_agent),
            language: LANGUAGES
                .choose(&mut *rng)
                .map(|s| s.to_string())
                .unwrap_or(fallback.language),
            timezone: TIMEZONES
                .choose(&mut *rng)
                .map(|s| s.to_string())
                .unwrap_or(fallback.timezone),
            window_size: WINDOW_SIZES
                .choose(&mut *rng)
                .copied()
                .unwrap_or(fallback.window_size),
        }
    }

    /// `Accept-Language` header value, always falling back to English.
    pub fn accept_language(&self) -> String {
        match self.language.split_once('-') {
            Some(("en", _)) => format!("{},en;q=0.9", self.language),
            Some((primary, _)) => format!("{},{primary};q=0.9,en;q=0.8", self.language),
            None => format!("{},en;q=0.9", self.language),
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} | {} | {} | {}x{}",
            self.user_agent, self.language, self.timezone, self.window_size.0, self.window_size.1
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn random_fingerprint_draws_from_pools() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let fp = BrowserFingerprint::random_with(&mut rng);
            assert!(USER_AGENTS.contains(&fp.user_agent.as_str()));
            assert!(LANGUAGES.contains(&fp.language.as_str()));
            assert!(TIMEZONES.contains(&fp.timezone.as_str()));
            assert!(WINDOW_SIZES.contains(&fp.window_size));
        }
    }

    #[test]
    fn accept_language_keeps_english_fallback() {
        let mut fp = BrowserFingerprint::default();
        assert_eq!(fp.accept_language(), "en-US,en;q=0.9");
        fp.language = "fr-FR".to_string();
        assert_eq!(fp.accept_language(), "fr-FR,fr;q=0.9,en;q=0.8");
    }
}
