use chrono::{NaiveDate, TimeZone, Utc};
use fieldbook_types::{
    DataObject, DataType, DataValue, Definition, DefinitionId, Entry, Experience, Page,
    Pagination, ValueParseError,
};
use pretty_assertions::assert_eq;

fn weight_definition() -> Definition {
    Definition::new(DefinitionId::from("def-1"), "weight", DataType::Integer)
}

// ── DataValue parsing ────────────────────────────────────────────

#[test]
fn parse_integer() {
    let v = DataValue::parse(DataType::Integer, "7").unwrap();
    assert_eq!(v, DataValue::Integer(7));
    assert!(v.matches(DataType::Integer));
}

#[test]
fn parse_decimal() {
    let v = DataValue::parse(DataType::Decimal, "2.5").unwrap();
    assert_eq!(v, DataValue::Decimal(2.5));
}

#[test]
fn parse_single_line_text() {
    let v = DataValue::parse(DataType::SingleLineText, "\"morning run\"").unwrap();
    assert_eq!(v, DataValue::SingleLineText("morning run".into()));
}

#[test]
fn parse_date() {
    let v = DataValue::parse(DataType::Date, "\"2021-03-04\"").unwrap();
    assert_eq!(
        v,
        DataValue::Date(NaiveDate::from_ymd_opt(2021, 3, 4).unwrap())
    );
}

#[test]
fn parse_datetime() {
    let v = DataValue::parse(DataType::Datetime, "\"2021-03-04T05:06:07Z\"").unwrap();
    assert_eq!(
        v,
        DataValue::Datetime(Utc.with_ymd_and_hms(2021, 3, 4, 5, 6, 7).unwrap())
    );
}

#[test]
fn parse_type_mismatch() {
    let err = DataValue::parse(DataType::Integer, "\"seven\"").unwrap_err();
    assert!(matches!(err, ValueParseError::TypeMismatch { .. }));
}

#[test]
fn parse_invalid_scalar() {
    let err = DataValue::parse(DataType::Integer, "not json").unwrap_err();
    assert!(matches!(err, ValueParseError::InvalidScalar { .. }));
}

#[test]
fn wire_round_trip_preserves_scalar() {
    let v = DataValue::parse(DataType::Date, "\"2021-03-04\"").unwrap();
    assert_eq!(v.to_json_string(), "\"2021-03-04\"");
}

// ── Model ────────────────────────────────────────────────────────

#[test]
fn offline_experience_has_offline_id() {
    let exp = Experience::offline("workouts", vec![weight_definition()]);
    assert!(exp.id.is_offline());
    assert_eq!(exp.title, "workouts");
    assert!(exp.entries.is_empty());
}

#[test]
fn entry_data_lookup_by_definition() {
    let def = weight_definition();
    let exp = Experience::offline("workouts", vec![def.clone()]);
    let entry = Entry::offline(
        exp.id.clone(),
        vec![DataObject::offline(def.id.clone(), DataValue::Integer(7))],
    );
    assert_eq!(entry.data_for(&def.id), Some(&DataValue::Integer(7)));
    assert_eq!(entry.data_for(&DefinitionId::from("other")), None);
}

#[test]
fn entry_position_is_zero_based() {
    let def = weight_definition();
    let mut exp = Experience::offline("workouts", vec![def.clone()]);
    let e1 = Entry::offline(
        exp.id.clone(),
        vec![DataObject::offline(def.id.clone(), DataValue::Integer(1))],
    );
    let e2 = Entry::offline(
        exp.id.clone(),
        vec![DataObject::offline(def.id.clone(), DataValue::Integer(2))],
    );
    exp.entries = Page::from_items(vec![e1.clone(), e2.clone()]);

    assert_eq!(exp.entry_position(&e1.id), Some(0));
    assert_eq!(exp.entry_position(&e2.id), Some(1));
}

#[test]
fn page_append_carries_pagination_forward() {
    let mut page = Page::from_items(vec![1, 2]);
    let mut next = Page::from_items(vec![3]);
    next.page_info.has_next_page = true;
    next.page_info.end_cursor = Some("c3".into());

    page.append(next);
    assert_eq!(page.items, vec![1, 2, 3]);
    assert!(page.page_info.has_next_page);
    assert_eq!(page.page_info.end_cursor.as_deref(), Some("c3"));
}

#[test]
fn pagination_constructors() {
    assert_eq!(Pagination::first(10).first, Some(10));
    let p = Pagination::after(10, "c1");
    assert_eq!(p.after.as_deref(), Some("c1"));
}
