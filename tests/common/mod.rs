//! Shared fixtures for the integration tests

#![allow(dead_code)]

use census_automl::config::{PathsConfig, SearchConfig};
use census_automl::data::write_parquet;
use census_automl::inference::CensusRecord;
use polars::prelude::*;

const EDUCATION: [&str; 12] = [
    "9th", "10th", "11th", "12th", "HS-grad", "Some-college", "Assoc-voc", "Assoc-acdm",
    "Bachelors", "Masters", "Prof-school", "Doctorate",
];
const WORKCLASS: [&str; 5] = ["State-gov", "Private", "?", "Self-emp-not-inc", "Federal-gov"];
const MARITAL: [&str; 3] = ["Married-civ-spouse", "Never-married", "Divorced"];
const OCCUPATION: [&str; 4] = ["Adm-clerical", "Exec-managerial", "?", "Craft-repair"];
const RELATIONSHIP: [&str; 3] = ["Husband", "Not-in-family", "Own-child"];
const RACE: [&str; 2] = ["White", "Black"];
const COUNTRY: [&str; 3] = ["United-States", "?", "Mexico"];

/// Deterministic raw census table with whitespace-padded strings, `fnlwgt`
/// and string labels. Rows are generated from `offset..offset + n`.
pub fn census_table(n: usize, offset: usize) -> DataFrame {
    let mut age = Vec::with_capacity(n);
    let mut workclass = Vec::with_capacity(n);
    let mut fnlwgt = Vec::with_capacity(n);
    let mut education = Vec::with_capacity(n);
    let mut education_num = Vec::with_capacity(n);
    let mut marital = Vec::with_capacity(n);
    let mut occupation = Vec::with_capacity(n);
    let mut relationship = Vec::with_capacity(n);
    let mut race = Vec::with_capacity(n);
    let mut sex = Vec::with_capacity(n);
    let mut gain = Vec::with_capacity(n);
    let mut loss = Vec::with_capacity(n);
    let mut hours = Vec::with_capacity(n);
    let mut country = Vec::with_capacity(n);
    let mut target = Vec::with_capacity(n);

    for k in offset..offset + n {
        let edu = 5 + (k * 7) % 12;
        let h = 20 + (k * 13) % 40;
        let m = MARITAL[k % 3];
        let g = if k % 9 == 0 { 5000 } else { 0 };
        let score = usize::from(edu >= 11)
            + usize::from(h >= 45)
            + usize::from(m == "Married-civ-spouse")
            + usize::from(g > 0);

        age.push(20 + (k * 11 % 45) as i64);
        workclass.push(format!(" {}", WORKCLASS[k % 5]));
        fnlwgt.push(100_000 + (k as i64) * 37);
        education.push(format!(" {}", EDUCATION[edu - 5]));
        education_num.push(edu as i64);
        marital.push(format!(" {}", m));
        occupation.push(format!(" {}", OCCUPATION[k % 4]));
        relationship.push(format!(" {}", RELATIONSHIP[k % 3]));
        race.push(format!(" {}", RACE[k % 2]));
        sex.push(if k % 2 == 0 { " Male" } else { " Female" }.to_string());
        gain.push(g as i64);
        loss.push(if k % 11 == 0 { 1902i64 } else { 0 });
        hours.push(h as i64);
        country.push(format!(" {}", COUNTRY[k % 3]));
        target.push(if score >= 2 { " >50K" } else { " <=50K" }.to_string());
    }

    df! {
        "age" => age,
        "workclass" => workclass,
        "fnlwgt" => fnlwgt,
        "education" => education,
        "education-num" => education_num,
        "marital-status" => marital,
        "occupation" => occupation,
        "relationship" => relationship,
        "race" => race,
        "sex" => sex,
        "capital-gain" => gain,
        "capital-loss" => loss,
        "hours-per-week" => hours,
        "native-country" => country,
        "target_class" => target,
    }
    .unwrap()
}

/// Raw train and test tables written where `paths` expects them
pub fn write_raw_tables(paths: &PathsConfig) {
    write_parquet(&mut census_table(60, 0), &paths.train_data).unwrap();
    write_parquet(&mut census_table(30, 1000), &paths.test_data).unwrap();
}

/// Small, fast search settings
pub fn quick_search(n_trials: usize) -> SearchConfig {
    SearchConfig::new()
        .with_n_trials(n_trials)
        .with_num_boost_round(5)
        .with_seed(7)
}

pub fn record() -> CensusRecord {
    CensusRecord {
        age: 52,
        workclass: "Self-emp-not-inc".into(),
        education: "Masters".into(),
        education_num: 14,
        marital_status: "Married-civ-spouse".into(),
        occupation: "Exec-managerial".into(),
        relationship: "Husband".into(),
        race: "White".into(),
        sex: "Male".into(),
        capital_gain: 15024,
        capital_loss: 0,
        hours_per_week: 50,
        native_country: "United-States".into(),
    }
}
