use crate::geocoder::{Geocoder, GeocoderResult};
use crate::hierarchy::Type;
use crate::ids::GeoObjectId;

const CERTAINTY_EPS: f64 = 1e-3;

const REGIONS_DATA: &str = concat!(
    "C00000000004B279 {\"type\": \"Feature\", \"geometry\": {\"type\": \"Point\", ",
    "\"coordinates\": [-80.1142033187951, 21.55511095]}, \"properties\": {\"kind\": \"country\", ",
    "\"locales\": {\"default\": {\"name\": \"Cuba\", \"address\": {\"country\": \"Cuba\"}}}, ",
    "\"rank\": 2}}\n",
    "C0000000001C4CA7 {\"type\": \"Feature\", \"geometry\": {\"type\": \"Point\", ",
    "\"coordinates\": [-78.7260117405499, 21.74300205]}, \"properties\": {\"kind\": \"province\", ",
    "\"locales\": {\"default\": {\"name\": \"Ciego de Ávila\", \"address\": ",
    "{\"region\": \"Ciego de Ávila\", \"country\": \"Cuba\"}}}, \"rank\": 4}}\n",
    "C00000000059D6B5 {\"type\": \"Feature\", \"geometry\": {\"type\": \"Point\", ",
    "\"coordinates\": [-78.9263054493181, 22.08185765]}, \"properties\": {\"kind\": \"district\", ",
    "\"locales\": {\"default\": {\"name\": \"Florencia\", \"address\": ",
    "{\"subregion\": \"Florencia\", \"region\": \"Ciego de Ávila\", \"country\": \"Cuba\"}}}, ",
    "\"rank\": 6}}\n",
);

fn geocoder_from(data: &str) -> Geocoder {
    Geocoder::from_jsonl_reader(data.as_bytes(), false, 1).unwrap()
}

fn id(encoded: u64) -> GeoObjectId {
    GeoObjectId::from_encoded(encoded)
}

#[track_caller]
fn check(geocoder: &Geocoder, query: &str, expected: &[(u64, f64)]) {
    let mut actual = geocoder.process_query(query);
    assert_eq!(actual.len(), expected.len(), "query {query:?}: {actual:?}");
    let mut expected: Vec<GeocoderResult> = expected
        .iter()
        .map(|(encoded, certainty)| GeocoderResult {
            osm_id: id(*encoded),
            certainty: *certainty,
        })
        .collect();
    actual.sort_by_key(|r| r.osm_id);
    expected.sort_by_key(|r| r.osm_id);
    for (a, e) in actual.iter().zip(&expected) {
        assert!(
            (0.0..=1.0).contains(&a.certainty),
            "query {query:?}: certainty {} out of range",
            a.certainty
        );
        assert_eq!(a.osm_id, e.osm_id, "query {query:?}");
        assert!(
            (a.certainty - e.certainty).abs() < CERTAINTY_EPS,
            "query {query:?}: id {:?} certainty {} expected {}",
            a.osm_id,
            a.certainty,
            e.certainty
        );
    }
}

#[test]
fn smoke() {
    let geocoder = geocoder_from(REGIONS_DATA);
    let florencia = 0xc00000000059d6b5;
    let cuba = 0xc00000000004b279;

    check(&geocoder, "florencia", &[(florencia, 1.0)]);
    check(&geocoder, "cuba florencia", &[(florencia, 1.0), (cuba, 0.713776)]);
    check(
        &geocoder,
        "florencia somewhere in cuba",
        &[(cuba, 0.713776), (florencia, 1.0)],
    );
    assert!(geocoder.process_query("").is_empty());
    assert!(geocoder.process_query(" ,;").is_empty());
}

#[test]
fn hierarchy_fields() {
    let geocoder = geocoder_from(REGIONS_DATA);
    let dictionary = geocoder.hierarchy().dictionary();

    let mut entries = vec![];
    geocoder
        .index()
        .for_each_doc_id(&["florencia".to_string()], |doc_id| {
            entries.push(geocoder.hierarchy().entries()[doc_id as usize].clone());
        });

    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(
        entry
            .normalized_names(Type::Country, dictionary)
            .unwrap()
            .main_name(),
        "cuba"
    );
    assert_eq!(
        entry
            .normalized_names(Type::Region, dictionary)
            .unwrap()
            .main_name(),
        "ciego de avila"
    );
    assert_eq!(
        entry
            .normalized_names(Type::Subregion, dictionary)
            .unwrap()
            .main_name(),
        "florencia"
    );
}

#[test]
fn english_names() {
    let data = concat!(
        "0000000000000010 {\"properties\": {\"kind\": \"city\", \"locales\": {\"default\": ",
        "{\"address\": {\"locality\": \"Москва\"}}, \"en\": {\"address\": ",
        "{\"locality\": \"Moscow\"}}}}}\n",
        "0000000000000011 {\"properties\": {\"kind\": \"street\", \"locales\": {\"default\": ",
        "{\"address\": {\"locality\": \"Москва\", \"street\": \"улица Новый Арбат\"}}, ",
        "\"en\": {\"address\": {\"locality\": \"Moscow\", \"street\": \"New Arbat Avenue\"}}}}}\n",
    );
    let geocoder = geocoder_from(data);
    check(&geocoder, "Moscow, New Arbat", &[(0x11, 1.0), (0x10, 0.558011)]);
}

#[test]
fn only_buildings() {
    let data = concat!(
        "0000000000000010 {\"properties\": {\"kind\": \"city\", \"locales\": {\"default\": ",
        "{\"address\": {\"locality\": \"Some Locality\"}}}}}\n",
        "0000000000000021 {\"properties\": {\"kind\": \"street\", \"locales\": {\"default\": ",
        "{\"address\": {\"street\": \"Good\", \"locality\": \"Some Locality\"}}}}}\n",
        "0000000000000022 {\"properties\": {\"kind\": \"building\", \"locales\": {\"default\": ",
        "{\"address\": {\"building\": \"5\", \"street\": \"Good\", \"locality\": \"Some Locality\"}}}}}\n",
        "0000000000000031 {\"properties\": {\"kind\": \"street\", \"locales\": {\"default\": ",
        "{\"address\": {\"street\": \"Bad\", \"locality\": \"Some Locality\"}}}}}\n",
        "0000000000000032 {\"properties\": {\"kind\": \"building\", \"locales\": {\"default\": ",
        "{\"address\": {\"building\": \"10\", \"street\": \"Bad\", \"locality\": \"Some Locality\"}}}}}\n",
        "0000000000000040 {\"properties\": {\"kind\": \"street\", \"locales\": {\"default\": ",
        "{\"address\": {\"street\": \"MaybeNumbered\", \"locality\": \"Some Locality\"}}}}}\n",
        "0000000000000041 {\"properties\": {\"kind\": \"street\", \"locales\": {\"default\": ",
        "{\"address\": {\"street\": \"MaybeNumbered-3\", \"locality\": \"Some Locality\"}}}}}\n",
        "0000000000000042 {\"properties\": {\"kind\": \"building\", \"locales\": {\"default\": ",
        "{\"address\": {\"building\": \"3\", \"street\": \"MaybeNumbered\", ",
        "\"locality\": \"Some Locality\"}}}}}\n",
    );
    let geocoder = geocoder_from(data);

    check(&geocoder, "some locality", &[(0x10, 1.0)]);
    check(&geocoder, "some locality good", &[(0x21, 1.0), (0x10, 0.834711)]);
    check(&geocoder, "some locality bad", &[(0x31, 1.0), (0x10, 0.834711)]);

    check(&geocoder, "some locality good 5", &[(0x22, 1.0)]);
    check(&geocoder, "some locality bad 10", &[(0x32, 1.0)]);

    // There is a building "10" on Bad Street but it must not appear under
    // Good Street, and the match must not degrade to the street either.
    check(&geocoder, "some locality good 10", &[]);

    // A non-building may still come out when all query tokens are used.
    check(
        &geocoder,
        "some locality maybenumbered 3",
        &[(0x41, 1.0), (0x42, 0.865248)],
    );
}

#[test]
fn mismatched_locality() {
    let data = concat!(
        "0000000000000010 {\"properties\": {\"kind\": \"city\", \"locales\": {\"default\": ",
        "{\"address\": {\"locality\": \"Moscow\"}}}}}\n",
        "0000000000000011 {\"properties\": {\"kind\": \"city\", \"locales\": {\"default\": ",
        "{\"address\": {\"locality\": \"Paris\"}}}}}\n",
        "0000000000000021 {\"properties\": {\"kind\": \"street\", \"locales\": {\"default\": ",
        "{\"address\": {\"street\": \"Krymskaya\", \"locality\": \"Moscow\"}}}}}\n",
        "0000000000000022 {\"properties\": {\"kind\": \"building\", \"locales\": {\"default\": ",
        "{\"address\": {\"building\": \"2\", \"street\": \"Krymskaya\", \"locality\": \"Moscow\"}}}}}\n",
        "0000000000000031 {\"properties\": {\"kind\": \"street\", \"locales\": {\"default\": ",
        "{\"address\": {\"street\": \"Krymskaya\", \"locality\": \"Paris\"}}}}}\n",
        "0000000000000032 {\"properties\": {\"kind\": \"building\", \"locales\": {\"default\": ",
        "{\"address\": {\"building\": \"3\", \"street\": \"Krymskaya\", \"locality\": \"Paris\"}}}}}\n",
    );
    let geocoder = geocoder_from(data);

    check(&geocoder, "Moscow Krymskaya 2", &[(0x22, 1.0)]);
    // Paris's "3" must not match under Moscow.
    check(&geocoder, "Moscow Krymskaya 3", &[]);
}

#[test]
fn house_number_partial_match() {
    let data = concat!(
        "0000000000000010 {\"properties\": {\"kind\": \"city\", \"locales\": {\"default\": ",
        "{\"address\": {\"locality\": \"Москва\"}}}}}\n",
        "0000000000000011 {\"properties\": {\"kind\": \"street\", \"locales\": {\"default\": ",
        "{\"address\": {\"street\": \"Зорге\", \"locality\": \"Москва\"}}}}}\n",
        "0000000000000012 {\"properties\": {\"kind\": \"building\", \"locales\": {\"default\": ",
        "{\"address\": {\"building\": \"7\", \"street\": \"Зорге\", \"locality\": \"Москва\"}}}}}\n",
        "0000000000000013 {\"properties\": {\"kind\": \"building\", \"locales\": {\"default\": ",
        "{\"address\": {\"building\": \"7 к2\", \"street\": \"Зорге\", \"locality\": \"Москва\"}}}}}\n",
        "0000000000000014 {\"properties\": {\"kind\": \"building\", \"locales\": {\"default\": ",
        "{\"address\": {\"building\": \"7 к2 с3\", \"street\": \"Зорге\", \"locality\": \"Москва\"}}}}}\n",
    );
    let geocoder = geocoder_from(data);

    check(
        &geocoder,
        "Москва, Зорге 7к2",
        &[(0x13, 1.0), (0x14, 0.995), (0x12, 0.975)],
    );
    check(
        &geocoder,
        "Москва, Зорге 7 к2",
        &[(0x13, 1.0), (0x14, 0.995), (0x12, 0.975)],
    );
    check(
        &geocoder,
        "Москва, Зорге 7",
        &[(0x12, 1.0), (0x13, 0.993), (0x14, 0.990)],
    );
    check(&geocoder, "Москва, Зорге 7к1", &[(0x12, 0.95)]);
    check(&geocoder, "Москва, Зорге 7A", &[(0x12, 0.95)]);
    check(&geocoder, "Москва, Зорге 7 A", &[(0x12, 0.95)]);
}

#[test]
fn moscow_locality_rank() {
    let data = concat!(
        "0000000000000010 {\"properties\": {\"kind\": \"state\", \"locales\": {\"default\": ",
        "{\"address\": {\"region\": \"Москва\"}}}, \"rank\": 2}}\n",
        "0000000000000011 {\"properties\": {\"kind\": \"city\", \"locales\": {\"default\": ",
        "{\"address\": {\"locality\": \"Москва\", \"region\": \"Москва\"}}, ",
        "\"en\": {\"address\": {\"locality\": \"Moscow\"}}}, \"rank\": 4}}\n",
        "0000000000000012 {\"properties\": {\"kind\": \"street\", \"locales\": {\"default\": ",
        "{\"address\": {\"street\": \"Ленинский проспект\", \"locality\": \"Москва\", ",
        "\"region\": \"Москва\"}}, \"en\": {\"address\": {\"locality\": \"Moscow\"}}}}}\n",
        "0000000000000020 {\"properties\": {\"kind\": \"state\", \"locales\": {\"default\": ",
        "{\"address\": {\"region\": \"Тверская Область\"}}}, \"rank\": 2}}\n",
        "0000000000000021 {\"properties\": {\"kind\": \"hamlet\", \"locales\": {\"default\": ",
        "{\"address\": {\"locality\": \"Москва\", \"region\": \"Тверская Область\"}}}, \"rank\": 4}}\n",
        "0000000000000022 {\"properties\": {\"kind\": \"street\", \"locales\": {\"default\": ",
        "{\"address\": {\"street\": \"Ленинский проспект\", \"locality\": \"Москва\", ",
        "\"region\": \"Тверская Область\"}}}}}\n",
    );
    let geocoder = geocoder_from(data);

    check(
        &geocoder,
        "Москва",
        &[(0x11, 1.0), (0x21, 0.207843), (0x10, 0.794118)],
    );
    check(
        &geocoder,
        "Москва, Ленинский проспект",
        &[
            (0x12, 1.0),
            (0x22, 0.556044),
            (0x11, 0.56044),
            (0x10, 0.445055),
            (0x21, 0.116484),
        ],
    );
}

#[test]
fn street_with_number_in_city() {
    let data = concat!(
        "0000000000000010 {\"properties\": {\"kind\": \"city\", \"locales\": {\"default\": ",
        "{\"address\": {\"locality\": \"Москва\"}}}}}\n",
        "0000000000000011 {\"properties\": {\"kind\": \"street\", \"locales\": {\"default\": ",
        "{\"address\": {\"locality\": \"Москва\", \"street\": \"улица 1905 года\"}}}}}\n",
        "0000000000000020 {\"properties\": {\"kind\": \"town\", \"locales\": {\"default\": ",
        "{\"address\": {\"locality\": \"Краснокамск\"}}}}}\n",
        "0000000000000028 {\"properties\": {\"kind\": \"street\", \"locales\": {\"default\": ",
        "{\"address\": {\"locality\": \"Краснокамск\", \"street\": \"улица 1905 года\"}}}}}\n",
    );
    let geocoder = geocoder_from(data);

    check(&geocoder, "Москва, улица 1905 года", &[(0x11, 1.0)]);
    check(&geocoder, "улица 1905 года", &[(0x11, 1.0), (0x28, 1.0)]);
    check(&geocoder, "Москва, 1905 года", &[(0x11, 1.0)]);
}

#[test]
fn street_with_number_and_synonym() {
    let data = concat!(
        "0000000000000010 {\"properties\": {\"kind\": \"city\", \"locales\": {\"default\": ",
        "{\"address\": {\"locality\": \"Москва\"}}}}}\n",
        "0000000000000013 {\"properties\": {\"kind\": \"street\", \"locales\": {\"default\": ",
        "{\"address\": {\"locality\": \"Москва\", \"street\": \"8 Марта\"}}}}}\n",
    );
    let geocoder = geocoder_from(data);
    check(&geocoder, "Москва, улица 8 Марта", &[(0x13, 1.0)]);
}

#[test]
fn street_with_two_numbers() {
    let data = concat!(
        "0000000000000010 {\"properties\": {\"kind\": \"city\", \"locales\": {\"default\": ",
        "{\"address\": {\"locality\": \"Москва\"}}}}}\n",
        "0000000000000012 {\"properties\": {\"kind\": \"street\", \"locales\": {\"default\": ",
        "{\"address\": {\"locality\": \"Москва\", \"street\": \"4-я улица 8 Марта\"}}}}}\n",
        "0000000000000013 {\"properties\": {\"kind\": \"street\", \"locales\": {\"default\": ",
        "{\"address\": {\"locality\": \"Москва\", \"street\": \"улица 8 Марта\"}}}}}\n",
    );
    let geocoder = geocoder_from(data);
    check(&geocoder, "Москва, 4-я улица 8 Марта", &[(0x12, 1.0)]);
}

#[test]
fn building_on_street_with_number() {
    let data = concat!(
        "0000000000000010 {\"properties\": {\"kind\": \"city\", \"locales\": {\"default\": ",
        "{\"address\": {\"locality\": \"Москва\"}}}}}\n",
        "0000000000000013 {\"properties\": {\"kind\": \"street\", \"locales\": {\"default\": ",
        "{\"address\": {\"locality\": \"Москва\", \"street\": \"улица 8 Марта\"}}}}}\n",
        "0000000000000015 {\"properties\": {\"kind\": \"building\", \"locales\": {\"default\": ",
        "{\"address\": {\"locality\": \"Москва\", \"street\": \"улица 8 Марта\", ",
        "\"building\": \"4\"}}}}}\n",
    );
    let geocoder = geocoder_from(data);
    check(&geocoder, "Москва, улица 8 Марта, 4", &[(0x15, 1.0)]);
}

#[test]
fn locality_building() {
    let data = concat!(
        "0000000000000010 {\"properties\": {\"kind\": \"city\", \"locales\": {\"default\": ",
        "{\"address\": {\"locality\": \"Zelenograd\"}}}}}\n",
        "0000000000000022 {\"properties\": {\"kind\": \"building\", \"locales\": {\"default\": ",
        "{\"address\": {\"building\": \"2\", \"locality\": \"Zelenograd\"}}}}}\n",
        "0000000000000031 {\"properties\": {\"kind\": \"street\", \"locales\": {\"default\": ",
        "{\"address\": {\"street\": \"Krymskaya\", \"locality\": \"Zelenograd\"}}}}}\n",
        "0000000000000032 {\"properties\": {\"kind\": \"building\", \"locales\": {\"default\": ",
        "{\"address\": {\"building\": \"2\", \"street\": \"Krymskaya\", ",
        "\"locality\": \"Zelenograd\"}}}}}\n",
    );
    let geocoder = geocoder_from(data);

    check(&geocoder, "Zelenograd 2", &[(0x22, 1.0)]);
    check(&geocoder, "Zelenograd, Krymskaya 2", &[(0x32, 1.0), (0x22, 0.72028)]);
}

#[test]
fn locality_building_rank_with_suburb() {
    let data = concat!(
        "0000000000000010 {\"properties\": {\"kind\": \"city\", \"locales\": {\"default\": ",
        "{\"address\": {\"locality\": \"Москва\"}}}}}\n",
        "0000000000000011 {\"properties\": {\"kind\": \"suburb\", \"locales\": {\"default\": ",
        "{\"address\": {\"suburb\": \"Арбат\", \"locality\": \"Москва\"}}}}}\n",
        "0000000000000012 {\"properties\": {\"kind\": \"building\", \"locales\": {\"default\": ",
        "{\"address\": {\"building\": \"1\", \"suburb\": \"Арбат\", \"locality\": \"Москва\"}}}}}\n",
        "0000000000000013 {\"properties\": {\"kind\": \"suburb\", \"locales\": {\"default\": ",
        "{\"address\": {\"suburb\": \"район Северный\", \"locality\": \"Москва\"}}}}}\n",
        "0000000000000014 {\"properties\": {\"kind\": \"building\", \"locales\": {\"default\": ",
        "{\"address\": {\"building\": \"1\", \"suburb\": \"район Северный\", ",
        "\"locality\": \"Москва\"}}}}}\n",
    );
    let geocoder = geocoder_from(data);
    check(&geocoder, "Москва, Арбат 1", &[(0x12, 1.0), (0x14, 0.830645)]);
}

#[test]
fn subregion_in_locality() {
    let data = concat!(
        "0000000000000010 {\"properties\": {\"kind\": \"state\", \"locales\": {\"default\": ",
        "{\"address\": {\"region\": \"Москва\"}}}, \"rank\": 2}}\n",
        "0000000000000011 {\"properties\": {\"kind\": \"city\", \"locales\": {\"default\": ",
        "{\"address\": {\"locality\": \"Москва\", \"region\": \"Москва\"}}}, \"rank\": 4}}\n",
        "0000000000000012 {\"properties\": {\"kind\": \"district\", \"locales\": {\"default\": ",
        "{\"address\": {\"subregion\": \"Северный административный округ\", ",
        "\"locality\": \"Москва\", \"region\": \"Москва\"}}}, \"rank\": 3}}\n",
    );
    let geocoder = geocoder_from(data);

    check(&geocoder, "Северный административный округ", &[(0x12, 1.0)]);
    check(
        &geocoder,
        "Москва, Северный административный округ",
        &[(0x12, 1.0), (0x11, 0.316181), (0x10, 0.251085)],
    );
    check(&geocoder, "Москва", &[(0x11, 1.0), (0x10, 0.794118)]);
}

#[test]
fn numerical_suburb_relevance() {
    let data = concat!(
        "0000000000000010 {\"properties\": {\"kind\": \"state\", \"locales\": {\"default\": ",
        "{\"address\": {\"region\": \"Metro Manila\"}}}}}\n",
        "0000000000000011 {\"properties\": {\"kind\": \"city\", \"locales\": {\"default\": ",
        "{\"address\": {\"locality\": \"Caloocan\", \"region\": \"Metro Manila\"}}}}}\n",
        "0000000000000012 {\"properties\": {\"kind\": \"suburb\", \"locales\": {\"default\": ",
        "{\"address\": {\"suburb\": \"60\", \"locality\": \"Caloocan\", ",
        "\"region\": \"Metro Manila\"}}}}}\n",
        "0000000000000020 {\"properties\": {\"kind\": \"city\", \"locales\": {\"default\": ",
        "{\"address\": {\"locality\": \"Белгород\"}}}}}\n",
        "0000000000000021 {\"properties\": {\"kind\": \"street\", \"locales\": {\"default\": ",
        "{\"address\": {\"street\": \"Щорса\", \"locality\": \"Белгород\"}}}}}\n",
        "0000000000000022 {\"properties\": {\"kind\": \"building\", \"locales\": {\"default\": ",
        "{\"address\": {\"building\": \"60\", \"street\": \"Щорса\", ",
        "\"locality\": \"Белгород\"}}}}}\n",
    );
    let geocoder = geocoder_from(data);

    check(&geocoder, "Caloocan, 60", &[(0x12, 1.0)]);
    check(&geocoder, "60", &[]);
    check(&geocoder, "Metro Manila, 60", &[(0x10, 1.0)]);
    check(&geocoder, "Белгород, Щорса, 60", &[(0x22, 1.0)]);
}

#[test]
fn city_vs_hamlet_rank() {
    let data = concat!(
        "0000000000000010 {\"properties\": {\"kind\": \"state\", \"locales\": {\"default\": ",
        "{\"address\": {\"region\": \"Оренбургская область\"}}}}}\n",
        "0000000000000011 {\"properties\": {\"kind\": \"hamlet\", \"locales\": {\"default\": ",
        "{\"address\": {\"locality\": \"Красноярск\", \"region\": \"Оренбургская область\"}}}}}\n",
        "0000000000000020 {\"properties\": {\"kind\": \"state\", \"locales\": {\"default\": ",
        "{\"address\": {\"region\": \"Красноярский край\"}}}}}\n",
        "0000000000000021 {\"properties\": {\"kind\": \"city\", \"locales\": {\"default\": ",
        "{\"address\": {\"locality\": \"Красноярск\", \"region\": \"Красноярский край\"}}}}}\n",
    );
    let geocoder = geocoder_from(data);
    check(&geocoder, "Красноярск", &[(0x21, 1.0), (0x11, 0.2099)]);
}

#[test]
fn binary_index_roundtrip() {
    let data = concat!(
        "0000000000000010 {\"properties\": {\"kind\": \"country\", \"locales\": {\"default\": ",
        "{\"address\": {\"country\": \"Россия\"}}, \"en\": {\"address\": ",
        "{\"country\": \"Russia\"}}}, \"rank\": 1}}\n",
        "0000000000000011 {\"properties\": {\"kind\": \"state\", \"locales\": {\"default\": ",
        "{\"address\": {\"region\": \"Москва\", \"country\": \"Россия\"}}}, \"rank\": 2}}\n",
        "0000000000000012 {\"properties\": {\"kind\": \"city\", \"locales\": {\"default\": ",
        "{\"address\": {\"locality\": \"Москва\", \"region\": \"Москва\", ",
        "\"country\": \"Россия\"}}}, \"rank\": 4}}\n",
        "0000000000000013 {\"properties\": {\"kind\": \"street\", \"locales\": {\"default\": ",
        "{\"address\": {\"street\": \"Арбат\", \"locality\": \"Москва\", \"region\": \"Москва\", ",
        "\"country\": \"Россия\"}}}, \"rank\": 7}}\n",
        "0000000000000015 {\"properties\": {\"kind\": \"building\", \"locales\": {\"default\": ",
        "{\"address\": {\"building\": \"4\", \"street\": \"Арбат\", \"locality\": \"Москва\", ",
        "\"region\": \"Москва\", \"country\": \"Россия\"}}}, \"rank\": 8}}\n",
    );
    let from_jsonl = geocoder_from(data);

    let mut bytes = vec![];
    from_jsonl.save_to_binary_index(&mut bytes).unwrap();
    let from_index = Geocoder::load_from_binary_index(bytes.as_slice()).unwrap();

    for name in ["russia", "россия", "москва", "арбат"] {
        let collect = |geocoder: &Geocoder| {
            let mut ids = vec![];
            geocoder
                .index()
                .for_each_doc_id(&[name.to_string()], |doc_id| {
                    ids.push(geocoder.hierarchy().entries()[doc_id as usize].osm_id);
                    geocoder.index().for_each_related_building(doc_id, |b| {
                        ids.push(geocoder.hierarchy().entries()[b as usize].osm_id);
                    });
                });
            ids
        };
        let a = collect(&from_jsonl);
        let b = collect(&from_index);
        assert!(!a.is_empty());
        assert_eq!(a, b, "token {name}");
    }

    // Query behavior survives the round-trip.
    let q = "Москва, Арбат 4";
    let before = from_jsonl.process_query(q);
    let after = from_index.process_query(q);
    assert_eq!(before.len(), after.len());
    for (x, y) in before.iter().zip(&after) {
        assert_eq!(x.osm_id, y.osm_id);
        assert!((x.certainty - y.certainty).abs() < 1e-12);
    }
}

#[test]
fn binary_index_version_mismatch_is_fatal() {
    let geocoder = geocoder_from(REGIONS_DATA);
    let mut bytes = vec![];
    geocoder.save_to_binary_index(&mut bytes).unwrap();
    bytes[8] = 0xff;
    assert!(Geocoder::load_from_binary_index(bytes.as_slice()).is_err());
    bytes[8] = 0x02;
    bytes[0] = b'X';
    assert!(Geocoder::load_from_binary_index(bytes.as_slice()).is_err());
}
