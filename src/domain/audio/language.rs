use serde::{Deserialize, Serialize};

/// ISO 639-1 language codes the newscast is published in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LanguageCode {
    #[serde(rename = "en")]
    English,
    #[serde(rename = "tr")]
    Turkish,
    #[serde(rename = "es")]
    Spanish,
    #[serde(rename = "fr")]
    French,
    #[serde(rename = "de")]
    German,
}

impl LanguageCode {
    /// Get the ISO 639-1 code as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            LanguageCode::English => "en",
            LanguageCode::Turkish => "tr",
            LanguageCode::Spanish => "es",
            LanguageCode::French => "fr",
            LanguageCode::German => "de",
        }
    }
}

impl std::str::FromStr for LanguageCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "en" => Ok(LanguageCode::English),
            "tr" => Ok(LanguageCode::Turkish),
            "es" => Ok(LanguageCode::Spanish),
            "fr" => Ok(LanguageCode::French),
            "de" => Ok(LanguageCode::German),
            other => Err(format!("unsupported language code: {other}")),
        }
    }
}

impl std::fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Get the appropriate Polly voice ID for a language (neural engine)
pub fn get_voice_for_language(language: LanguageCode) -> &'static str {
    match language {
        LanguageCode::English => "Joanna",
        LanguageCode::Turkish => "Burcu",
        LanguageCode::Spanish => "Lupe",
        LanguageCode::French => "Lea",
        LanguageCode::German => "Vicki",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_should_round_trip_codes() {
        for code in ["en", "tr", "es", "fr", "de"] {
            let lang: LanguageCode = code.parse().unwrap();
            assert_eq!(lang.as_str(), code);
        }
    }

    #[test]
    fn it_should_reject_unknown_codes() {
        assert!("xx".parse::<LanguageCode>().is_err());
    }
}
