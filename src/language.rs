use crate::config::Config;

/// Locale code → English language name.
const LANGUAGE_NAMES: &[(&str, &str)] = &[
    ("ar", "Arabic"),
    ("bg_BG", "Bulgarian"),
    ("bn", "Bengali"),
    ("ca", "Catalan"),
    ("cs", "Czech"),
    ("da", "Danish"),
    ("de", "German"),
    ("el", "Greek"),
    ("en", "English"),
    ("en_GB", "English (United Kingdom)"),
    ("eo", "Esperanto"),
    ("es", "Spanish"),
    ("eu", "Basque"),
    ("fa", "Persian"),
    ("fi", "Finnish"),
    ("fr", "French"),
    ("gl", "Galician"),
    ("he", "Hebrew"),
    ("hi", "Hindi"),
    ("hr", "Croatian"),
    ("hu", "Hungarian"),
    ("it_IT", "Italian"),
    ("ja", "Japanese"),
    ("ka", "Georgian"),
    ("kk", "Kazakh"),
    ("ko_KR", "Korean"),
    ("lt_LT", "Lithuanian"),
    ("lv", "Latvian"),
    ("nb_NO", "Norwegian Bokmål"),
    ("nl_NL", "Dutch"),
    ("pl", "Polish"),
    ("pl_PL", "Polish (Poland)"),
    ("pt_PT", "Portuguese"),
    ("pt_BR", "Portuguese (Brazil)"),
    ("ro", "Romanian"),
    ("ro_MD", "Romanian (Moldova)"),
    ("ru", "Russian"),
    ("sk", "Slovak"),
    ("sr", "Serbian"),
    ("sv", "Swedish"),
    ("th", "Thai"),
    ("tr", "Turkish"),
    ("uk", "Ukrainian"),
    ("vi", "Vietnamese"),
    ("vi_VN", "Vietnamese (Vietnam)"),
    ("zh", "Chinese"),
    ("zh_CN", "Simplified Chinese"),
    ("zh_TW", "Traditional Chinese (Taiwan)"),
];

/// English name for a locale code. Exact match first, then the bare
/// language part (`it` for `it_IT`, `de` for `de_AT`); anything unknown,
/// including names like "German", passes through unchanged.
pub fn language_name(code: &str) -> &str {
    let code = code.trim();
    if let Some((_, name)) = LANGUAGE_NAMES.iter().find(|(c, _)| *c == code) {
        return *name;
    }
    let base = code.split(['_', '-']).next().unwrap_or(code);
    LANGUAGE_NAMES
        .iter()
        .find(|(c, _)| c.split('_').next() == Some(base))
        .map(|(_, name)| *name)
        .unwrap_or(code)
}

/// System-prompt line asking for answers in the configured language.
pub fn response_instruction(config: &Config) -> Option<String> {
    let language = config.response_language()?;
    Some(format!("Always respond in {}.", language_name(language)))
}
