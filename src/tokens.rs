use unic_ucd_category::GeneralCategory;

pub fn tokens_iter(s: &str) -> impl Iterator<Item = &str> {
    s.split(|c| !is_token_charcter(c)).filter(|t| !t.is_empty())
}

/// Tokens of at least two characters, the usual bag-of-words token rule.
pub fn words_iter(s: &str) -> impl Iterator<Item = &str> {
    tokens_iter(s).filter(|t| t.chars().nth(1).is_some())
}

pub fn is_token_charcter(c: char) -> bool {
    let category = GeneralCategory::of(c);
    category.is_number() || category.is_letter() || category == GeneralCategory::PrivateUse
}
