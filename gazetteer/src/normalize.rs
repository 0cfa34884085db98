//! Name normalization and tokenization shared by the generator and geocoder.
//!
//! Normalization lowercases, folds common diacritics, strips punctuation and
//! collapses whitespace. It is idempotent: `normalize(normalize(s)) ==
//! normalize(s)`.

/// Query and name tokens.
pub type Tokens = Vec<String>;

/// Folds one character to its undecorated lowercase form.
///
/// Covers Latin-1 Supplement and the Latin Extended-A letters that occur in
/// OSM names, plus `ё` which Russian names use interchangeably with `е`.
fn fold_char(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => 'a',
        'ç' | 'ć' | 'ĉ' | 'ċ' | 'č' => 'c',
        'ď' | 'đ' => 'd',
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' => 'e',
        'ĝ' | 'ğ' | 'ġ' | 'ģ' => 'g',
        'ĥ' | 'ħ' => 'h',
        'ì' | 'í' | 'î' | 'ï' | 'ĩ' | 'ī' | 'ĭ' | 'į' | 'ı' => 'i',
        'ĵ' => 'j',
        'ķ' => 'k',
        'ĺ' | 'ļ' | 'ľ' | 'ŀ' | 'ł' => 'l',
        'ñ' | 'ń' | 'ņ' | 'ň' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ŏ' | 'ő' => 'o',
        'ŕ' | 'ŗ' | 'ř' => 'r',
        'ś' | 'ŝ' | 'ş' | 'š' => 's',
        'ţ' | 'ť' | 'ŧ' => 't',
        'ù' | 'ú' | 'û' | 'ü' | 'ũ' | 'ū' | 'ŭ' | 'ů' | 'ű' | 'ų' => 'u',
        'ŵ' => 'w',
        'ý' | 'ÿ' | 'ŷ' => 'y',
        'ź' | 'ż' | 'ž' => 'z',
        'ß' => 's',
        'ё' => 'е',
        _ => c,
    }
}

/// Splits a string into normalized tokens.
///
/// Tokens are maximal runs of alphanumeric characters; everything else is a
/// separator. Each token is lowercased and diacritics-folded.
pub fn normalize_and_tokenize(s: &str) -> Tokens {
    let mut tokens = Tokens::new();
    let mut current = String::new();
    for c in s.chars() {
        if c.is_alphanumeric() {
            for lc in c.to_lowercase() {
                current.push(fold_char(lc));
            }
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Normalizes a string: tokenizes and joins the tokens with single spaces.
pub fn normalize(s: &str) -> String {
    normalize_and_tokenize(s).join(" ")
}

/// Checks whether the string consists of ASCII digits only.
pub fn is_ascii_numeric(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Street-designator synonyms recognized by the geocoder when they are left
/// over next to a matched street name.
pub fn is_street_synonym(token: &str) -> bool {
    matches!(
        token,
        "street"
            | "st"
            | "avenue"
            | "ave"
            | "av"
            | "road"
            | "rd"
            | "lane"
            | "ln"
            | "drive"
            | "dr"
            | "boulevard"
            | "blvd"
            | "square"
            | "sq"
            | "embankment"
            | "highway"
            | "hwy"
            | "ulitsa"
            | "ul"
            | "prospekt"
            | "pr"
            | "pereulok"
            | "per"
            | "shosse"
            | "sh"
            | "naberezhnaya"
            | "nab"
            | "bulvar"
            | "улица"
            | "ул"
            | "проспект"
            | "пр"
            | "переулок"
            | "пер"
            | "шоссе"
            | "ш"
            | "набережная"
            | "наб"
            | "бульвар"
            | "площадь"
            | "пл"
            | "проезд"
            | "тупик"
    )
}
