//! Crawler detection from the request's user agent.

use regex::Regex;

use crate::Error;
use crate::config::BotPattern;

/// Matches user agents against the configured crawler signatures.
#[derive(Debug, Clone)]
pub struct BotDetector {
    patterns: Vec<(String, Regex)>,
}

impl BotDetector {
    /// Compile `bots` in order.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` naming the first pattern that fails to
    /// compile.
    pub fn new(bots: &[BotPattern]) -> Result<Self, Error> {
        let patterns = bots
            .iter()
            .map(|bot| {
                Regex::new(&bot.pattern)
                    .map(|re| (bot.name.clone(), re))
                    .map_err(|e| Error::Configuration(format!("invalid bot pattern for {}: {e}", bot.name)))
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { patterns })
    }

    /// Name of the first bot whose pattern matches `user_agent`.
    pub fn detect(&self, user_agent: Option<&str>) -> Option<&str> {
        let user_agent = user_agent?;
        self.patterns
            .iter()
            .find(|(_, re)| re.is_match(user_agent))
            .map(|(name, _)| name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;

    #[test]
    fn test_detects_default_crawlers() {
        let detector = BotDetector::new(&SessionConfig::default().bots).unwrap();
        let ua = "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";
        assert_eq!(detector.detect(Some(ua)), Some("Googlebot"));
        assert_eq!(detector.detect(Some("Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0")), None);
        assert_eq!(detector.detect(None), None);
    }

    #[test]
    fn test_first_match_wins() {
        let bots = vec![
            BotPattern { name: "Generic".into(), pattern: "bot".into() },
            BotPattern { name: "Specific".into(), pattern: "examplebot".into() },
        ];
        let detector = BotDetector::new(&bots).unwrap();
        assert_eq!(detector.detect(Some("examplebot/1.0")), Some("Generic"));
    }

    #[test]
    fn test_invalid_pattern() {
        let bots = vec![BotPattern { name: "Broken".into(), pattern: "(".into() }];
        assert!(matches!(BotDetector::new(&bots), Err(Error::Configuration(_))));
    }
}
