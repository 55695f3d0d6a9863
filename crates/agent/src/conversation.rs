//! Rule-based reading of a single utterance: slot extractors and the intent classifier.
//!
//! Everything here is synchronous and total. A miss is `None`, never an error.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde_json::{json, Map, Value};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use reune_core::domain::conversation::{
    Intent, SLOT_EVENT_DATE, SLOT_EVENT_TYPE, SLOT_PEOPLE_COUNT,
};

/// Keyword to canonical label. Table order decides ties.
const EVENT_TYPES: &[(&str, &str)] = &[
    ("churrasco", "churrasco"),
    ("pizza", "pizza"),
    ("feijoada", "feijoada"),
    ("aniversario", "aniversário"),
    ("aniversário", "aniversário"),
    ("jantar", "jantar"),
];

const UNITS: &[(&str, u32)] = &[
    ("zero", 0),
    ("um", 1),
    ("uma", 1),
    ("dois", 2),
    ("duas", 2),
    ("tres", 3),
    ("quatro", 4),
    ("cinco", 5),
    ("seis", 6),
    ("sete", 7),
    ("oito", 8),
    ("nove", 9),
    ("dez", 10),
    ("onze", 11),
    ("doze", 12),
    ("treze", 13),
    ("quatorze", 14),
    ("catorze", 14),
    ("quinze", 15),
    ("dezesseis", 16),
    ("dezessete", 17),
    ("dezoito", 18),
    ("dezenove", 19),
];

const TENS: &[(&str, u32)] =
    &[("vinte", 20), ("trinta", 30), ("quarenta", 40), ("cinquenta", 50)];

const NUMBER_WORDS: &[(&str, u32)] = &[
    ("um", 1),
    ("uma", 1),
    ("dois", 2),
    ("duas", 2),
    ("três", 3),
    ("tres", 3),
    ("quatro", 4),
    ("cinco", 5),
    ("seis", 6),
    ("sete", 7),
    ("oito", 8),
    ("nove", 9),
    ("dez", 10),
    ("onze", 11),
    ("doze", 12),
    ("treze", 13),
    ("catorze", 14),
    ("quinze", 15),
    ("dezesseis", 16),
    ("dezessete", 17),
    ("dezoito", 18),
    ("dezenove", 19),
    ("vinte", 20),
    ("trinta", 30),
    ("quarenta", 40),
    ("cinquenta", 50),
    ("sessenta", 60),
    ("setenta", 70),
    ("oitenta", 80),
    ("noventa", 90),
    ("cem", 100),
];

const MONTHS: &[(&str, u32)] = &[
    ("janeiro", 1),
    ("jan", 1),
    ("fevereiro", 2),
    ("fev", 2),
    ("marco", 3),
    ("mar", 3),
    ("abril", 4),
    ("abr", 4),
    ("maio", 5),
    ("mai", 5),
    ("junho", 6),
    ("jun", 6),
    ("julho", 7),
    ("jul", 7),
    ("agosto", 8),
    ("ago", 8),
    ("setembro", 9),
    ("set", 9),
    ("outubro", 10),
    ("out", 10),
    ("novembro", 11),
    ("nov", 11),
    ("dezembro", 12),
    ("dez", 12),
];

const CONFIRM_TOKENS: &[&str] = &[
    "sim",
    "ok",
    "confirmo",
    "confirmar",
    "confirma",
    "confirmado",
    "fechado",
    "beleza",
    "perfeito",
    "bora",
];
const CONFIRM_PHRASES: &[&str] = &["pode seguir", "manda ver", "to dentro"];
const GENERATE_TOKENS: &[&str] = &["lista", "itens", "item", "compras"];
const UPDATE_TOKENS: &[&str] =
    &["mudar", "muda", "alterar", "altera", "atualizar", "atualiza", "trocar", "troca", "editar"];
const GENERIC_EVENT_TOKENS: &[&str] = &["evento", "festa", "encontro", "confraternizacao"];
const SMALL_TALK_TOKENS: &[&str] =
    &["oi", "ola", "opa", "obrigado", "obrigada", "valeu", "tchau", "flw"];
const SMALL_TALK_PHRASES: &[&str] = &["bom dia", "boa tarde", "boa noite", "tudo bem"];
const CORRECTION_TOKENS: &[&str] = &["nao", "errado", "errei", "melhor", "prefiro", "corrigindo"];
const CORRECTION_PHRASES: &[&str] =
    &["na verdade", "na real", "quero mudar", "mudar para", "trocar para"];

/// Category words accepted by item commands, with the list categories they cover.
const CATEGORY_WORDS: &[(&str, &[&str])] = &[
    ("comida", &["carnes", "acompanhamentos"]),
    ("carne", &["carnes"]),
    ("bebida", &["bebidas"]),
    ("acompanhamento", &["acompanhamentos"]),
    ("tempero", &["temperos"]),
    ("utensilio", &["utensilios"]),
];

/// Words that name event details, never list items.
const NON_ITEM_TARGETS: &[&str] =
    &["pessoa", "pessoas", "convidado", "convidados", "gente", "data", "dia", "evento"];

/// Lower-cases, strips diacritics and trims.
pub fn normalize_text(text: &str) -> String {
    let stripped: String = text.nfd().filter(|c| !is_combining_mark(*c)).collect();
    stripped.to_lowercase().trim().to_string()
}

fn tokenize(normalized: &str) -> Vec<&str> {
    normalized.split(|c: char| !c.is_alphanumeric()).filter(|token| !token.is_empty()).collect()
}

fn lookup(table: &[(&str, u32)], word: &str) -> Option<u32> {
    table.iter().find(|(key, _)| *key == word).map(|(_, value)| *value)
}

/// First keyword of the event-type table contained in the text.
pub fn parse_event_type(text: &str) -> Option<&'static str> {
    let lowered = text.trim().to_lowercase();
    EVENT_TYPES.iter().find(|(keyword, _)| lowered.contains(keyword)).map(|(_, label)| *label)
}

/// Guest count. A bare 1 to 3 digit numeral wins over number words. Otherwise number
/// words are accumulated left to right and the last phrase closed by a non-number
/// word is kept.
pub fn parse_people_count(text: &str) -> Option<u32> {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    let digits = DIGITS.get_or_init(|| Regex::new(r"\b(\d{1,3})\b").expect("valid regex"));

    let normalized = normalize_text(text);
    if let Some(captures) = digits.captures(&normalized) {
        let count = captures[1].parse::<u32>().ok()?;
        return Some(count.max(1));
    }

    let mut total = 0;
    let mut accumulator = 0;
    for token in tokenize(&normalized) {
        if let Some(value) = lookup(UNITS, token).or_else(|| lookup(TENS, token)) {
            accumulator += value;
        } else if token == "e" || token.starts_with("pesso") {
            continue;
        } else if accumulator > 0 {
            total = accumulator;
            accumulator = 0;
        }
    }

    let total = if total > 0 { total } else { accumulator };
    (total > 0).then_some(total)
}

/// Generic numeral. The first number word anywhere in the text wins, then the first digit run.
pub fn parse_number(text: &str) -> Option<u32> {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    let digits = DIGITS.get_or_init(|| Regex::new(r"\b(\d+)\b").expect("valid regex"));

    let lowered = text.trim().to_lowercase();
    if let Some(value) = lowered.split_whitespace().find_map(|word| lookup(NUMBER_WORDS, word)) {
        return Some(value);
    }

    digits.captures(&lowered).and_then(|captures| captures[1].parse::<u32>().ok())
}

/// Event date in `yyyy-mm-dd`, `dd/mm[/yy|yyyy]` or `[dia] X de <mês> [de yyyy]` form.
/// A missing year falls back to `reference_year`; impossible calendar dates are a miss.
pub fn parse_event_date(text: &str, reference_year: i32) -> Option<NaiveDate> {
    static ISO: OnceLock<Regex> = OnceLock::new();
    static NUMERIC: OnceLock<Regex> = OnceLock::new();
    static SPOKEN: OnceLock<Regex> = OnceLock::new();

    let iso = ISO.get_or_init(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("valid regex"));
    let numeric = NUMERIC.get_or_init(|| {
        Regex::new(r"\b(\d{1,2})/(\d{1,2})(?:/(\d{2,4}))?\b").expect("valid regex")
    });
    let spoken = SPOKEN.get_or_init(|| {
        Regex::new(r"\b(?:dia\s+)?(\d{1,2})\s+de\s+([a-z]+)(?:\s+de\s+(\d{4}))?")
            .expect("valid regex")
    });

    let normalized = normalize_text(text);

    if let Some(captures) = iso.captures(&normalized) {
        let year = captures[1].parse().ok()?;
        let month = captures[2].parse().ok()?;
        let day = captures[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if let Some(captures) = numeric.captures(&normalized) {
        let day = captures[1].parse().ok()?;
        let month = captures[2].parse().ok()?;
        let year = match captures.get(3).map(|m| m.as_str()) {
            None => reference_year,
            Some(raw) if raw.len() == 2 => 2000 + raw.parse::<i32>().ok()?,
            Some(raw) if raw.len() == 4 => raw.parse().ok()?,
            Some(_) => return None,
        };
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    let captures = spoken.captures(&normalized)?;
    let day = captures[1].parse().ok()?;
    let month = MONTHS.iter().find(|(name, _)| *name == &captures[2]).map(|(_, month)| *month)?;
    let year = match captures.get(3) {
        Some(raw) => raw.as_str().parse().ok()?,
        None => reference_year,
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Keyword classifier in fixed priority order: confirmation, item list, update,
/// domain event keyword, generic event keyword, small talk, then `unknown`.
pub fn classify(text: &str) -> Intent {
    let normalized = normalize_text(text);
    let tokens = tokenize(&normalized);
    let has_token = |words: &[&str]| tokens.iter().any(|token| words.contains(token));
    let has_phrase = |phrases: &[&str]| phrases.iter().any(|phrase| normalized.contains(phrase));

    if has_token(CONFIRM_TOKENS) || has_phrase(CONFIRM_PHRASES) {
        Intent::ConfirmEvent
    } else if has_token(GENERATE_TOKENS) {
        Intent::GenerateItems
    } else if has_token(UPDATE_TOKENS) {
        Intent::UpdateEvent
    } else if parse_event_type(text).is_some() || has_token(GENERIC_EVENT_TOKENS) {
        Intent::CreateEvent
    } else if has_token(SMALL_TALK_TOKENS) || has_phrase(SMALL_TALK_PHRASES) {
        Intent::SmallTalk
    } else {
        Intent::Unknown
    }
}

/// The user is taking back something said earlier ("na verdade", "não", "melhor"...).
pub fn detect_correction(text: &str) -> bool {
    let normalized = normalize_text(text);
    let tokens = tokenize(&normalized);
    tokens.iter().any(|token| CORRECTION_TOKENS.contains(token))
        || CORRECTION_PHRASES.iter().any(|phrase| normalized.contains(phrase))
}

/// What an item command applies to.
#[derive(Clone, Debug, PartialEq)]
pub enum EditTarget {
    Item(String),
    /// Canonical category word, see [`category_members`].
    Category(&'static str),
    All,
}

/// A natural-language edit of the pending item list.
#[derive(Clone, Debug, PartialEq)]
pub enum ItemCommand {
    Add { name: String, quantity: Option<f64> },
    Remove { name: String },
    SetQuantity { name: String, quantity: f64 },
    AdjustQuantity { name: String, delta: f64 },
    Multiply { target: EditTarget, factor: f64 },
}

/// List categories covered by a canonical category word.
pub fn category_members(category: &str) -> &'static [&'static str] {
    CATEGORY_WORDS
        .iter()
        .find(|(word, _)| *word == category)
        .map(|(_, members)| *members)
        .unwrap_or(&[])
}

/// Imperative item edits: remove, add, set, multiply, then `mais N`/`menos N` deltas.
/// The command must open the utterance.
pub fn parse_item_command(text: &str) -> Option<ItemCommand> {
    static REMOVE: OnceLock<Regex> = OnceLock::new();
    static REMOVE_NEGATED: OnceLock<Regex> = OnceLock::new();
    static ADD: OnceLock<Regex> = OnceLock::new();
    static SET: OnceLock<Regex> = OnceLock::new();
    static MULTIPLY: OnceLock<Regex> = OnceLock::new();
    static DELTA: OnceLock<Regex> = OnceLock::new();

    let remove = REMOVE.get_or_init(|| {
        Regex::new(concat!(
            r"^(?:tira|remove|exclui|apaga|retira|deleta)\s+",
            r"(?:(?:o|a|os|as)\s+)?(?:item\s+)?(.+?)(?:\s+da\s+lista)?$",
        ))
        .expect("valid regex")
    });
    let remove_negated = REMOVE_NEGATED.get_or_init(|| {
        Regex::new(r"^nao\s+(?:quero|preciso|quer)\s+(?:(?:o|a|os|as)\s+)?(.+)$")
            .expect("valid regex")
    });
    let add = ADD.get_or_init(|| {
        Regex::new(concat!(
            r"^(?:adiciona|coloca|inclui|poe|bota)\s+(?:mais\s+)?",
            r"(?:(\d+(?:[,.]\d+)?)\s*(?:(?:kg|g|l|litros?|un|unidades?|pacotes?)\s+)?(?:de\s+)?)?",
            r"(.+?)(?:\s+a\s+mais)?(?:\s+na\s+lista)?$",
        ))
        .expect("valid regex")
    });
    let set = SET.get_or_init(|| {
        Regex::new(concat!(
            r"^(?:aumenta|sobe|diminui|reduz|baixa|muda|altera|troca|deixa)\s+",
            r"(?:(?:o|a|os|as)\s+)?(.+?)\s+(?:para|pra|em|com)\s+(\d+(?:[,.]\d+)?)$",
        ))
        .expect("valid regex")
    });
    let multiply = MULTIPLY.get_or_init(|| {
        Regex::new(concat!(
            r"^(dobra|dobrar|duplica|triplica|triplicar|multiplica\s+por\s+(\d+))\s+",
            r"(?:(?:o|a|os|as)\s+)?(.+?)(?:\s+de\s+novo)?$",
        ))
        .expect("valid regex")
    });
    let delta = DELTA.get_or_init(|| {
        Regex::new(r"^(mais|menos)\s+(\d+(?:[,.]\d+)?)\s*(.+)$").expect("valid regex")
    });

    let normalized = normalize_text(text);
    let normalized = normalized.trim_end_matches(['.', '!', '?', ' ']);

    let command = if let Some(captures) =
        remove.captures(normalized).or_else(|| remove_negated.captures(normalized))
    {
        ItemCommand::Remove { name: item_name(&captures[1])? }
    } else if let Some(captures) = add.captures(normalized) {
        ItemCommand::Add {
            name: item_name(&captures[2])?,
            quantity: captures.get(1).and_then(|raw| decimal(raw.as_str())),
        }
    } else if let Some(captures) = set.captures(normalized) {
        let quantity = decimal(&captures[2])?;
        ItemCommand::SetQuantity { name: item_name(&captures[1])?, quantity }
    } else if let Some(captures) = multiply.captures(normalized) {
        let factor = match captures.get(2) {
            Some(raw) => decimal(raw.as_str())?,
            None if captures[1].starts_with("triplica") => 3.0,
            None => 2.0,
        };
        ItemCommand::Multiply { target: edit_target(&captures[3])?, factor }
    } else if let Some(captures) = delta.captures(normalized) {
        let amount = decimal(&captures[2])?;
        let delta = if &captures[1] == "mais" { amount } else { -amount };
        ItemCommand::AdjustQuantity { name: item_name(&captures[3])?, delta }
    } else {
        return None;
    };
    Some(command)
}

fn decimal(raw: &str) -> Option<f64> {
    raw.replace(',', ".").parse::<f64>().ok().filter(|value| value.is_finite())
}

fn item_name(raw: &str) -> Option<String> {
    let name = raw.trim();
    if name.is_empty() || NON_ITEM_TARGETS.contains(&name) {
        return None;
    }
    Some(name.to_string())
}

fn edit_target(raw: &str) -> Option<EditTarget> {
    let raw = raw.trim();
    if matches!(raw, "tudo" | "todos" | "todas" | "todos os itens" | "a lista") {
        return Some(EditTarget::All);
    }
    let singular = raw.strip_suffix('s').unwrap_or(raw);
    if let Some(&(word, _)) = CATEGORY_WORDS.iter().find(|(word, _)| *word == singular) {
        return Some(EditTarget::Category(word));
    }
    item_name(raw).map(EditTarget::Item)
}

/// Advisory reading of one utterance.
#[derive(Clone, Debug, PartialEq)]
pub struct MessageSignals {
    pub intent: Intent,
    pub event_type: Option<&'static str>,
    pub people_count: Option<u32>,
    pub event_date: Option<NaiveDate>,
    pub correction: bool,
}

impl MessageSignals {
    /// A correction that carries event details reads as `update_event` even when the
    /// keyword classifier found nothing.
    pub fn read(text: &str, reference_year: i32) -> Self {
        let mut signals = Self {
            intent: classify(text),
            event_type: parse_event_type(text),
            people_count: parse_people_count(text),
            event_date: parse_event_date(text, reference_year),
            correction: detect_correction(text),
        };
        if signals.corrects_slots() && matches!(signals.intent, Intent::Unknown | Intent::SmallTalk)
        {
            signals.intent = Intent::UpdateEvent;
        }
        signals
    }

    /// Both core slots were found in this single utterance.
    pub fn has_core_slots(&self) -> bool {
        self.event_type.is_some() && self.people_count.is_some()
    }

    /// A correction that names at least one slot value.
    pub fn corrects_slots(&self) -> bool {
        let names_a_slot =
            self.event_type.is_some() || self.people_count.is_some() || self.event_date.is_some();
        self.correction && names_a_slot
    }

    /// Extracted slots in envelope payload form.
    pub fn payload(&self) -> Map<String, Value> {
        let mut payload = Map::new();
        if let Some(event_type) = self.event_type {
            payload.insert(SLOT_EVENT_TYPE.to_string(), json!(event_type));
        }
        if let Some(people_count) = self.people_count {
            payload.insert(SLOT_PEOPLE_COUNT.to_string(), json!(people_count));
        }
        if let Some(date) = self.event_date {
            payload
                .insert(SLOT_EVENT_DATE.to_string(), json!(date.format("%Y-%m-%d").to_string()));
        }
        payload
    }

    /// Confidence assigned to an envelope built from these signals alone.
    pub fn rule_confidence(&self) -> f64 {
        match self.intent {
            Intent::Unknown => 0.3,
            Intent::CreateEvent | Intent::UpdateEvent if self.has_core_slots() => 0.8,
            _ => 0.6,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use reune_core::domain::conversation::Intent;

    use super::{
        category_members, classify, detect_correction, normalize_text, parse_event_date,
        parse_event_type, parse_item_command, parse_number, parse_people_count, EditTarget,
        ItemCommand, MessageSignals,
    };

    #[test]
    fn normalization_strips_accents_and_case() {
        assert_eq!(
            normalize_text("  Três Pessoas no Aniversário "),
            "tres pessoas no aniversario"
        );
    }

    #[test]
    fn event_type_uses_table_order() {
        assert_eq!(parse_event_type("Churrasco com pizza"), Some("churrasco"));
        assert_eq!(parse_event_type("pizza e feijoada"), Some("pizza"));
        assert_eq!(parse_event_type("meu aniversario"), Some("aniversário"));
        assert_eq!(parse_event_type("meu aniversário"), Some("aniversário"));
        assert_eq!(parse_event_type("um encontro qualquer"), None);
    }

    #[test]
    fn people_count_prefers_digits_over_words() {
        assert_eq!(parse_people_count("vinte pessoas, na verdade 12"), Some(12));
        assert_eq!(parse_people_count("churrasco para 0 pessoas"), Some(1));
        assert_eq!(parse_people_count("somos 1000"), None);
    }

    #[test]
    fn people_count_accumulates_number_words() {
        assert_eq!(parse_people_count("vinte e tres pessoas"), Some(23));
        assert_eq!(parse_people_count("vinte e três pessoas"), Some(23));
        assert_eq!(parse_people_count("dez"), Some(10));
        assert_eq!(
            parse_people_count("quinze pessoas, ou melhor trinta e duas pessoas ok"),
            Some(32)
        );
        assert_eq!(parse_people_count("nenhum numero aqui"), None);
        assert_eq!(parse_people_count("zero pessoas"), None);
    }

    #[test]
    fn generic_number_takes_first_word_then_digits() {
        assert_eq!(parse_number("dez"), Some(10));
        assert_eq!(parse_number("temos 10 convidados"), Some(10));
        assert_eq!(parse_number("dez ou vinte"), Some(10));
        assert_eq!(parse_number("cinco convidados e 30 cadeiras"), Some(5));
        assert_eq!(parse_number("ninguem"), None);
    }

    #[test]
    fn dates_parse_in_all_supported_forms() {
        let expected = NaiveDate::from_ymd_opt(2026, 11, 15);
        assert_eq!(parse_event_date("dia 2026-11-15", 2025), expected);
        assert_eq!(parse_event_date("no dia 15/11", 2026), expected);
        assert_eq!(parse_event_date("15/11/26", 2020), expected);
        assert_eq!(parse_event_date("15/11/2026", 2020), expected);
        assert_eq!(parse_event_date("dia 15 de novembro", 2026), expected);
        assert_eq!(parse_event_date("15 de nov de 2026", 2020), expected);
        assert_eq!(parse_event_date("3 de março", 2026), NaiveDate::from_ymd_opt(2026, 3, 3));
    }

    #[test]
    fn impossible_dates_are_a_miss() {
        assert_eq!(parse_event_date("31/02", 2026), None);
        assert_eq!(parse_event_date("dia 12 de brumario", 2026), None);
        assert_eq!(parse_event_date("sem data", 2026), None);
    }

    #[test]
    fn classifier_follows_priority_order() {
        assert_eq!(classify("ok, fechado"), Intent::ConfirmEvent);
        assert_eq!(classify("me mostra a lista de itens do churrasco"), Intent::GenerateItems);
        assert_eq!(classify("quero mudar a data"), Intent::UpdateEvent);
        assert_eq!(classify("vamos fazer um churrasco"), Intent::CreateEvent);
        assert_eq!(classify("quero organizar uma festa"), Intent::CreateEvent);
        assert_eq!(classify("Olá, bom dia!"), Intent::SmallTalk);
        assert_eq!(classify("qual a previsão do tempo"), Intent::Unknown);
    }

    #[test]
    fn signals_build_a_payload_from_extracted_slots() {
        let signals = MessageSignals::read("churrasco para 15 pessoas dia 20/12", 2026);
        assert_eq!(signals.intent, Intent::CreateEvent);
        assert!(signals.has_core_slots());

        let payload = signals.payload();
        assert_eq!(payload.get("tipo_evento"), Some(&json!("churrasco")));
        assert_eq!(payload.get("qtd_pessoas"), Some(&json!(15)));
        assert_eq!(payload.get("data_evento"), Some(&json!("2026-12-20")));
    }

    #[test]
    fn corrections_are_detected_by_marker_words() {
        let cases = [
            ("na verdade somos 15", true),
            ("não, é pizza", true),
            ("ou melhor, dia 20/12", true),
            ("quero mudar para feijoada", true),
            ("prefiro jantar", true),
            ("churrasco para 10 pessoas", false),
            ("confirmo", false),
        ];
        for (text, expected) in cases {
            assert_eq!(detect_correction(text), expected, "{text}");
        }
    }

    #[test]
    fn corrections_with_details_read_as_updates() {
        let corrected = MessageSignals::read("na verdade somos 15 pessoas", 2026);
        assert!(corrected.correction);
        assert!(corrected.corrects_slots());
        assert_eq!(corrected.intent, Intent::UpdateEvent);
        assert_eq!(corrected.people_count, Some(15));

        let vague = MessageSignals::read("não sei ainda", 2026);
        assert!(vague.correction);
        assert!(!vague.corrects_slots());
        assert_ne!(vague.intent, Intent::UpdateEvent);

        let plain = MessageSignals::read("churrasco para 10 pessoas", 2026);
        assert!(!plain.correction);
        assert_eq!(plain.intent, Intent::CreateEvent);
    }

    #[test]
    fn item_commands_cover_every_operation() {
        let item = |name: &str| name.to_string();
        let cases = [
            ("tira a cerveja", Some(ItemCommand::Remove { name: item("cerveja") })),
            (
                "Remove o item sal grosso da lista",
                Some(ItemCommand::Remove { name: item("sal grosso") }),
            ),
            (
                "não quero o queijo coalho",
                Some(ItemCommand::Remove { name: item("queijo coalho") }),
            ),
            (
                "adiciona 3 gelo",
                Some(ItemCommand::Add { name: item("gelo"), quantity: Some(3.0) }),
            ),
            (
                "põe mais 2,5 kg de farofa",
                Some(ItemCommand::Add { name: item("farofa"), quantity: Some(2.5) }),
            ),
            (
                "coloca guardanapo na lista",
                Some(ItemCommand::Add { name: item("guardanapo"), quantity: None }),
            ),
            (
                "aumenta a cerveja para 30",
                Some(ItemCommand::SetQuantity { name: item("cerveja"), quantity: 30.0 }),
            ),
            (
                "muda o carvão pra 12.",
                Some(ItemCommand::SetQuantity { name: item("carvao"), quantity: 12.0 }),
            ),
            (
                "dobra a picanha",
                Some(ItemCommand::Multiply {
                    target: EditTarget::Item(item("picanha")),
                    factor: 2.0,
                }),
            ),
            (
                "triplica as bebidas",
                Some(ItemCommand::Multiply { target: EditTarget::Category("bebida"), factor: 3.0 }),
            ),
            (
                "multiplica por 4 tudo",
                Some(ItemCommand::Multiply { target: EditTarget::All, factor: 4.0 }),
            ),
            (
                "mais 10 refrigerante",
                Some(ItemCommand::AdjustQuantity { name: item("refrigerante"), delta: 10.0 }),
            ),
            (
                "menos 5 agua",
                Some(ItemCommand::AdjustQuantity { name: item("agua"), delta: -5.0 }),
            ),
            ("muda as pessoas para 15", None),
            ("confirmo", None),
            ("quero um churrasco", None),
        ];
        for (text, expected) in cases {
            assert_eq!(parse_item_command(text), expected, "{text}");
        }
    }

    #[test]
    fn category_words_map_to_list_categories() {
        assert_eq!(category_members("comida"), &["carnes", "acompanhamentos"]);
        assert_eq!(category_members("bebida"), &["bebidas"]);
        assert!(category_members("brinquedo").is_empty());
    }
}
