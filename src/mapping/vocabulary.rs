//! Per-language field name vocabularies

use std::collections::HashMap;

use once_cell::sync::Lazy;

use super::types::FieldRole;

type Vocabulary = &'static [(FieldRole, &'static [&'static str])];

const ENG: Vocabulary = &[
    (
        FieldRole::Title,
        &["title", "name", "event_name", "eventname", "event_title", "headline", "subject"],
    ),
    (
        FieldRole::Description,
        &["description", "desc", "details", "summary", "notes", "body", "text"],
    ),
    (
        FieldRole::Timestamp,
        &[
            "date", "datetime", "timestamp", "time", "start_date", "start_time", "event_date",
            "start", "when", "occurred_at",
        ],
    ),
    (
        FieldRole::Location,
        &["address", "location", "place", "venue", "addr", "street_address", "full_address"],
    ),
    (FieldRole::Latitude, &["latitude", "lat"]),
    (FieldRole::Longitude, &["longitude", "lon", "lng", "long"]),
];

const DEU: Vocabulary = &[
    (FieldRole::Title, &["titel", "bezeichnung", "veranstaltung", "ueberschrift", "name"]),
    (FieldRole::Description, &["beschreibung", "details", "notizen", "inhalt", "text"]),
    (FieldRole::Timestamp, &["datum", "zeitpunkt", "zeit", "uhrzeit", "beginn", "startdatum"]),
    (FieldRole::Location, &["adresse", "anschrift", "ort", "standort", "veranstaltungsort"]),
    (FieldRole::Latitude, &["breitengrad", "breite"]),
    (FieldRole::Longitude, &["laengengrad", "laenge"]),
];

const FRA: Vocabulary = &[
    (FieldRole::Title, &["titre", "intitule", "nom"]),
    (FieldRole::Description, &["description", "details", "remarques"]),
    (FieldRole::Timestamp, &["date", "heure", "horodatage", "debut"]),
    (FieldRole::Location, &["adresse", "lieu", "emplacement"]),
    (FieldRole::Latitude, &["latitude"]),
    (FieldRole::Longitude, &["longitude"]),
];

const SPA: Vocabulary = &[
    (FieldRole::Title, &["titulo", "nombre"]),
    (FieldRole::Description, &["descripcion", "detalles"]),
    (FieldRole::Timestamp, &["fecha", "hora", "inicio"]),
    (FieldRole::Location, &["direccion", "ubicacion", "lugar"]),
    (FieldRole::Latitude, &["latitud"]),
    (FieldRole::Longitude, &["longitud"]),
];

const ITA: Vocabulary = &[
    (FieldRole::Title, &["titolo", "nome"]),
    (FieldRole::Description, &["descrizione", "dettagli"]),
    (FieldRole::Timestamp, &["data", "ora", "inizio"]),
    (FieldRole::Location, &["indirizzo", "luogo", "posizione"]),
    (FieldRole::Latitude, &["latitudine"]),
    (FieldRole::Longitude, &["longitudine"]),
];

const NLD: Vocabulary = &[
    (FieldRole::Title, &["titel", "naam"]),
    (FieldRole::Description, &["beschrijving", "omschrijving"]),
    (FieldRole::Timestamp, &["datum", "tijd", "begin"]),
    (FieldRole::Location, &["adres", "locatie", "plaats"]),
    (FieldRole::Latitude, &["breedtegraad"]),
    (FieldRole::Longitude, &["lengtegraad"]),
];

const POR: Vocabulary = &[
    (FieldRole::Title, &["titulo", "nome"]),
    (FieldRole::Description, &["descricao", "detalhes"]),
    (FieldRole::Timestamp, &["data", "hora", "inicio"]),
    (FieldRole::Location, &["endereco", "localizacao", "local"]),
    (FieldRole::Latitude, &["latitude"]),
    (FieldRole::Longitude, &["longitude"]),
];

static VOCABULARIES: Lazy<HashMap<&'static str, Vocabulary>> = Lazy::new(|| {
    HashMap::from([
        ("eng", ENG),
        ("deu", DEU),
        ("fra", FRA),
        ("spa", SPA),
        ("ita", ITA),
        ("nld", NLD),
        ("por", POR),
    ])
});

/// Map an ISO 639-1/639-2 code to a supported ISO 639-3 code, else "eng"
pub fn normalize_language(code: &str) -> &'static str {
    match code.trim().to_lowercase().as_str() {
        "de" | "deu" | "ger" | "german" => "deu",
        "fr" | "fra" | "fre" | "french" => "fra",
        "es" | "spa" | "spanish" => "spa",
        "it" | "ita" | "italian" => "ita",
        "nl" | "nld" | "dut" | "dutch" => "nld",
        "pt" | "por" | "portuguese" => "por",
        _ => "eng",
    }
}

/// Terms for a role: the language's own first, English after
pub(super) fn terms_for(language: &str, role: FieldRole) -> Vec<&'static str> {
    let mut terms: Vec<&'static str> = Vec::new();
    for code in [normalize_language(language), "eng"] {
        let Some(vocab) = VOCABULARIES.get(code) else {
            continue;
        };
        for (_, words) in vocab.iter().filter(|(r, _)| *r == role) {
            for word in words.iter() {
                if !terms.contains(word) {
                    terms.push(*word);
                }
            }
        }
    }
    terms
}

/// Lowercase, fold accents, collapse separators to '_'
pub fn normalize_field_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_sep = true;
    for c in name.chars().flat_map(char::to_lowercase) {
        let folded: &str = match c {
            'ä' => "ae",
            'ö' => "oe",
            'ü' => "ue",
            'ß' => "ss",
            'á' | 'à' | 'â' | 'ã' => "a",
            'é' | 'è' | 'ê' | 'ë' => "e",
            'í' | 'ì' | 'î' | 'ï' => "i",
            'ó' | 'ò' | 'ô' | 'õ' => "o",
            'ú' | 'ù' | 'û' => "u",
            'ç' => "c",
            'ñ' => "n",
            c if c.is_ascii_alphanumeric() => {
                out.push(c);
                last_sep = false;
                continue;
            }
            _ => {
                if !last_sep {
                    out.push('_');
                    last_sep = true;
                }
                continue;
            }
        };
        out.push_str(folded);
        last_sep = false;
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}
