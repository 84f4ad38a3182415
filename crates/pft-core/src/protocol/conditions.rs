use super::{
    AgeRange, ConditionId, ConditionProtocol, RedFlagPredicate, RedFlagRule, SymptomQuestion,
    SymptomRole,
};

use RedFlagPredicate::{AnySymptom, Reported};
use SymptomRole::{Main, Supporting};

// ── Shared red flags ────────────────────────────────────────

const PREGNANCY: RedFlagRule = RedFlagRule {
    id: "pregnancy",
    prompt: "you are or might be pregnant",
    keywords: &["pregnant", "pregnancy", "expecting a baby"],
    predicate: Reported,
};

const IMMUNOSUPPRESSED: RedFlagRule = RedFlagRule {
    id: "immunosuppressed",
    prompt: "you have a weakened immune system, for example from chemotherapy",
    keywords: &[
        "immunosuppressed",
        "weak immune",
        "weakened immune",
        "chemotherapy",
        "chemo",
        "transplant",
        "hiv",
    ],
    predicate: Reported,
};

const HIGH_TEMPERATURE: RedFlagRule = RedFlagRule {
    id: "high_temperature",
    prompt: "a high temperature, shivering or shaking",
    keywords: &[
        "fever",
        "high temperature",
        "temperature",
        "shivering",
        "shaking",
        "chills",
        "rigors",
    ],
    predicate: Reported,
};

const fn q(
    id: &'static str,
    prompt: &'static str,
    role: SymptomRole,
    keywords: &'static [&'static str],
) -> SymptomQuestion {
    SymptomQuestion {
        id,
        prompt,
        role,
        keywords,
    }
}

const fn flag(
    id: &'static str,
    prompt: &'static str,
    keywords: &'static [&'static str],
) -> RedFlagRule {
    RedFlagRule {
        id,
        prompt,
        keywords,
        predicate: Reported,
    }
}

pub(super) fn all() -> Vec<ConditionProtocol> {
    vec![
        uncomplicated_uti(),
        shingles(),
        acute_sinusitis(),
        acute_sore_throat(),
        acute_otitis_media(),
        impetigo(),
        infected_insect_bite(),
    ]
}

fn uncomplicated_uti() -> ConditionProtocol {
    ConditionProtocol {
        condition: ConditionId::UncomplicatedUti,
        questions: vec![
            q(
                "burning_pain",
                "pain or burning when you pass urine",
                Main,
                &[
                    "burning",
                    "burn",
                    "burns",
                    "stinging",
                    "stings",
                    "painful urination",
                    "pain when i pee",
                    "pain when urinating",
                    "hurts to pee",
                    "dysuria",
                ],
            ),
            q(
                "frequency",
                "needing to pass urine more often than usual",
                Main,
                &[
                    "frequent",
                    "frequently",
                    "more often",
                    "all the time",
                    "frequency",
                    "keep needing to pee",
                ],
            ),
            q(
                "nocturia",
                "getting up at night to pass urine",
                Main,
                &[
                    "at night",
                    "nocturia",
                    "wake up to pee",
                    "waking up to pee",
                    "up in the night",
                ],
            ),
            q(
                "cloudy_urine",
                "cloudy urine",
                Main,
                &["cloudy", "murky", "milky urine"],
            ),
            q(
                "urgency",
                "a sudden urge to pass urine",
                Supporting,
                &["urgency", "urgent need", "sudden urge", "can't hold"],
            ),
            q(
                "lower_tummy_pain",
                "pain low down in your tummy",
                Supporting,
                &["lower tummy", "lower abdomen", "lower abdominal", "pelvic pain"],
            ),
        ],
        red_flags: vec![
            HIGH_TEMPERATURE,
            flag(
                "loin_pain",
                "pain in your back or side, just below the ribs",
                &["back pain", "loin pain", "side pain", "flank pain", "kidney pain"],
            ),
            flag(
                "visible_blood",
                "blood in your urine",
                &["blood", "bloody", "bleeding"],
            ),
            flag(
                "confusion",
                "feeling confused or very drowsy",
                &["confused", "confusion", "very drowsy"],
            ),
            PREGNANCY,
        ],
        main_symptom_threshold: 2,
        eligible_age: AgeRange {
            min: Some(16),
            max: Some(64),
        },
    }
}

fn shingles() -> ConditionProtocol {
    ConditionProtocol {
        condition: ConditionId::Shingles,
        questions: vec![
            q(
                "painful_rash",
                "a painful rash or blisters",
                Main,
                &["rash", "blisters", "blister"],
            ),
            q(
                "one_sided_band",
                "a rash in a band on one side of your body",
                Main,
                &["one side", "band", "stripe", "strip"],
            ),
            q(
                "tingling_pain",
                "tingling, burning or stabbing pain in the skin",
                Main,
                &["tingling", "burning", "stabbing", "prickling"],
            ),
            q(
                "feeling_unwell",
                "feeling generally unwell or tired",
                Supporting,
                &["unwell", "tired", "fatigue", "headache"],
            ),
            q(
                "rash_near_eye",
                "a rash near your eye or on the tip of your nose",
                Supporting,
                &["near my eye", "around my eye", "eyelid", "tip of my nose"],
            ),
        ],
        red_flags: vec![
            RedFlagRule {
                id: "eye_involvement",
                prompt: "any problems with your eyes or vision",
                keywords: &["vision", "blurred", "eye pain", "red eye"],
                predicate: AnySymptom(&["rash_near_eye"]),
            },
            flag(
                "widespread_rash",
                "a rash spreading all over your body",
                &["all over", "widespread", "whole body"],
            ),
            IMMUNOSUPPRESSED,
            PREGNANCY,
        ],
        main_symptom_threshold: 2,
        eligible_age: AgeRange {
            min: Some(18),
            max: None,
        },
    }
}

fn acute_sinusitis() -> ConditionProtocol {
    ConditionProtocol {
        condition: ConditionId::AcuteSinusitis,
        questions: vec![
            q(
                "nasal_blockage",
                "a blocked or stuffy nose",
                Main,
                &["blocked nose", "stuffy", "congested", "congestion", "blocked"],
            ),
            q(
                "nasal_discharge",
                "a runny nose or mucus",
                Main,
                &["runny nose", "discharge", "mucus", "snot", "catarrh"],
            ),
            q(
                "facial_pain",
                "pain or pressure in your face or forehead",
                Main,
                &["facial pain", "face hurts", "pressure", "cheeks", "forehead"],
            ),
            q(
                "reduced_smell",
                "a reduced sense of smell",
                Main,
                &["smell", "can't smell", "cannot smell"],
            ),
        ],
        red_flags: vec![
            flag(
                "eye_swelling",
                "swelling or redness around your eye, or double vision",
                &["swollen eye", "eye swelling", "swelling around", "double vision"],
            ),
            flag(
                "severe_headache",
                "a severe headache or swelling of your forehead",
                &["severe headache", "worst headache", "forehead swelling"],
            ),
            flag(
                "neurological_signs",
                "confusion, a stiff neck or drowsiness",
                &["confused", "confusion", "stiff neck", "drowsy"],
            ),
            HIGH_TEMPERATURE,
            IMMUNOSUPPRESSED,
        ],
        main_symptom_threshold: 2,
        eligible_age: AgeRange {
            min: Some(12),
            max: None,
        },
    }
}

fn acute_sore_throat() -> ConditionProtocol {
    ConditionProtocol {
        condition: ConditionId::AcuteSoreThroat,
        questions: vec![
            q(
                "fever",
                "a fever in the last 24 hours",
                Main,
                &["fever", "temperature", "feverish"],
            ),
            q(
                "pus_on_tonsils",
                "white spots or pus on your tonsils",
                Main,
                &["pus", "white spots", "white patches"],
            ),
            q(
                "rapid_onset",
                "symptoms that started within the last three days",
                Main,
                &["started yesterday", "came on quickly", "sudden", "few days"],
            ),
            q(
                "inflamed_tonsils",
                "very swollen or red tonsils",
                Main,
                &["swollen tonsils", "inflamed tonsils", "red tonsils", "tonsils"],
            ),
            q(
                "painful_swallowing",
                "pain when swallowing",
                Supporting,
                &["hurts to swallow", "painful swallowing", "pain when swallowing"],
            ),
        ],
        red_flags: vec![
            flag(
                "difficulty_breathing",
                "difficulty breathing or noisy breathing",
                &[
                    "can't breathe",
                    "cannot breathe",
                    "difficulty breathing",
                    "breathless",
                    "noisy breathing",
                    "stridor",
                ],
            ),
            flag(
                "drooling",
                "drooling or being unable to swallow",
                &["drooling", "can't swallow", "unable to swallow"],
            ),
            flag(
                "muffled_voice",
                "a muffled voice",
                &["muffled voice", "muffled", "hot potato"],
            ),
            flag(
                "dehydration",
                "being unable to drink",
                &["can't drink", "not drinking", "dehydrated"],
            ),
            IMMUNOSUPPRESSED,
        ],
        main_symptom_threshold: 3,
        eligible_age: AgeRange {
            min: Some(5),
            max: None,
        },
    }
}

fn acute_otitis_media() -> ConditionProtocol {
    ConditionProtocol {
        condition: ConditionId::AcuteOtitisMedia,
        questions: vec![
            q(
                "ear_pain",
                "ear pain",
                Main,
                &["ear pain", "earache", "ear ache", "ear hurts", "pulling at"],
            ),
            q(
                "ear_discharge",
                "fluid or discharge coming from the ear",
                Main,
                &["discharge", "fluid", "pus", "leaking"],
            ),
            q(
                "fever",
                "a high temperature",
                Main,
                &["fever", "temperature", "hot"],
            ),
            q(
                "reduced_hearing",
                "difficulty hearing",
                Supporting,
                &["can't hear", "hearing", "muffled"],
            ),
        ],
        red_flags: vec![
            flag(
                "swelling_behind_ear",
                "swelling or redness behind the ear",
                &["behind the ear", "swelling behind", "mastoid"],
            ),
            flag("stiff_neck", "a stiff neck", &["stiff neck", "neck stiffness"]),
            flag(
                "very_unwell",
                "being very unwell, floppy or hard to wake",
                &["floppy", "unresponsive", "very unwell", "hard to wake", "won't wake"],
            ),
            flag(
                "facial_weakness",
                "weakness or drooping of the face",
                &["drooping", "facial weakness", "face droop"],
            ),
        ],
        main_symptom_threshold: 2,
        eligible_age: AgeRange {
            min: Some(1),
            max: Some(17),
        },
    }
}

fn impetigo() -> ConditionProtocol {
    ConditionProtocol {
        condition: ConditionId::Impetigo,
        questions: vec![
            q(
                "golden_crusts",
                "golden-brown crusts on the skin",
                Main,
                &["golden", "crust", "crusts", "crusty", "honey"],
            ),
            q(
                "sores",
                "red sores or blisters",
                Main,
                &["sores", "sore", "blisters", "spots"],
            ),
            q(
                "spreading",
                "patches that are spreading",
                Main,
                &["spreading", "spread", "getting bigger"],
            ),
            q("itching", "itching", Supporting, &["itch", "itchy", "itching"]),
        ],
        red_flags: vec![
            flag(
                "widespread_lesions",
                "patches all over your body",
                &["all over", "widespread", "everywhere"],
            ),
            HIGH_TEMPERATURE,
            flag(
                "recurrent",
                "impetigo that keeps coming back",
                &["keeps coming back", "recurrent", "again and again"],
            ),
            IMMUNOSUPPRESSED,
        ],
        main_symptom_threshold: 2,
        eligible_age: AgeRange {
            min: Some(1),
            max: None,
        },
    }
}

fn infected_insect_bite() -> ConditionProtocol {
    ConditionProtocol {
        condition: ConditionId::InfectedInsectBite,
        questions: vec![
            q(
                "spreading_redness",
                "redness spreading around the bite",
                Main,
                &["redness", "red area", "going red", "spreading"],
            ),
            q(
                "swelling",
                "swelling around the bite",
                Main,
                &["swollen", "swelling", "puffy"],
            ),
            q(
                "warm_to_touch",
                "skin that feels hot to the touch",
                Main,
                &["hot to touch", "warm", "warmth", "feels hot"],
            ),
            q(
                "pain",
                "pain or tenderness",
                Main,
                &["painful", "tender", "hurts", "sore"],
            ),
            q("pus", "pus or discharge from the bite", Supporting, &["pus", "oozing"]),
        ],
        red_flags: vec![
            flag(
                "breathing_difficulty",
                "difficulty breathing, wheezing or a swollen face or throat",
                &[
                    "can't breathe",
                    "difficulty breathing",
                    "wheezing",
                    "throat swelling",
                    "swollen tongue",
                    "swollen face",
                ],
            ),
            flag(
                "systemically_unwell",
                "a high temperature or feeling very unwell",
                &["fever", "high temperature", "shivering", "very unwell"],
            ),
            flag("tick_bite", "a tick bite", &["tick"]),
            flag(
                "animal_bite",
                "a bite from an animal or person",
                &["dog bite", "cat bite", "animal bite", "human bite"],
            ),
        ],
        main_symptom_threshold: 2,
        eligible_age: AgeRange {
            min: Some(1),
            max: None,
        },
    }
}
