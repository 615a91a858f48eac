use fieldbook_types::{
    CreateEntryError, DataObject, DataObjectError, DataObjectFieldError, DataType, DataValue,
    Definition, DefinitionError, DefinitionId, Entry, Experience, ExperienceSyncErrors,
    OwnFieldsError, UpdateEntryError, fold_create_entry_error, fold_experience_errors,
    fold_update_entry_error,
};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;

fn weight_definition() -> Definition {
    Definition::new(DefinitionId::from("def-1"), "weight", DataType::Integer)
}

fn experience_with_entries(count: usize) -> (Experience, Vec<Entry>) {
    let def = weight_definition();
    let mut exp = Experience::offline("workouts", vec![def.clone()]);
    let entries: Vec<Entry> = (0..count)
        .map(|n| {
            Entry::offline(
                exp.id.clone(),
                vec![DataObject::offline(
                    def.id.clone(),
                    DataValue::Integer(n as i64),
                )],
            )
        })
        .collect();
    exp.entries = fieldbook_types::Page::from_items(entries.clone());
    (exp, entries)
}

// ── Per-kind folds ───────────────────────────────────────────────

#[test]
fn nonspecific_data_object_error_gets_empty_label() {
    // An offline entry with one integer value rejected at field index 0
    // folds to a single line with an empty field label.
    let (exp, entries) = experience_with_entries(1);
    let mut errors = ExperienceSyncErrors::default();
    errors.create_entries.insert(
        entries[0].id.clone(),
        CreateEntryError {
            error: None,
            data_objects: vec![DataObjectError {
                index: 0,
                error: Some("is invalid".into()),
                ..Default::default()
            }],
        },
    );

    let displayed = fold_experience_errors(&exp.entries.items, &exp.definitions, &errors);
    assert_eq!(displayed.entries.len(), 1);
    let summary = &displayed.entries[0];
    assert_eq!(summary.index, 1); // 1-based entry index
    assert_eq!(
        summary.errors,
        vec![(String::new(), "is invalid".to_string())]
    );
}

#[test]
fn data_field_error_resolves_definition_name() {
    let error = CreateEntryError {
        error: None,
        data_objects: vec![DataObjectError {
            index: 0,
            data: Some("is too large".into()),
            ..Default::default()
        }],
    };
    let folded = fold_create_entry_error(&error, &[weight_definition()]);
    assert_eq!(folded, vec![("weight".to_string(), "is too large".to_string())]);
}

#[test]
fn whole_entry_update_error_folds_to_single_line() {
    let (_, entries) = experience_with_entries(1);
    let error = UpdateEntryError::Entry("entry not found".into());
    let folded = fold_update_entry_error(&error, &entries[0], &[weight_definition()]);
    assert_eq!(folded, vec![(String::new(), "entry not found".to_string())]);
}

#[test]
fn per_data_object_update_error_folds_per_field() {
    let (_, entries) = experience_with_entries(1);
    let mut map = BTreeMap::new();
    map.insert(
        entries[0].data_objects[0].id.clone(),
        DataObjectFieldError {
            data: Some("is invalid".into()),
            definition: None,
        },
    );
    let folded = fold_update_entry_error(
        &UpdateEntryError::DataObjects(map),
        &entries[0],
        &[weight_definition()],
    );
    assert_eq!(folded, vec![("weight".to_string(), "is invalid".to_string())]);
}

// ── Aggregate fold ───────────────────────────────────────────────

#[test]
fn entry_indices_are_positions_in_containing_list() {
    let (exp, entries) = experience_with_entries(5);
    let mut errors = ExperienceSyncErrors::default();
    // Errors at positions 2 and 5 (1-based).
    errors
        .create_entries
        .insert(entries[1].id.clone(), CreateEntryError::general("bad"));
    errors
        .create_entries
        .insert(entries[4].id.clone(), CreateEntryError::general("worse"));

    let displayed = fold_experience_errors(&exp.entries.items, &exp.definitions, &errors);
    let indices: Vec<usize> = displayed.entries.iter().map(|e| e.index).collect();
    assert_eq!(indices, vec![2, 5]);
}

#[test]
fn errors_for_removed_entries_are_skipped() {
    let (exp, _) = experience_with_entries(1);
    let mut errors = ExperienceSyncErrors::default();
    errors.create_entries.insert(
        fieldbook_types::EntryId::from("gone"),
        CreateEntryError::general("bad"),
    );

    let displayed = fold_experience_errors(&exp.entries.items, &exp.definitions, &errors);
    assert!(displayed.entries.is_empty());
}

#[test]
fn fold_is_rebuilt_fresh_each_pass() {
    let (exp, entries) = experience_with_entries(2);
    let mut errors = ExperienceSyncErrors::default();
    errors
        .create_entries
        .insert(entries[0].id.clone(), CreateEntryError::general("bad"));

    let first = fold_experience_errors(&exp.entries.items, &exp.definitions, &errors);
    // Resolving the error and folding again yields no stale line.
    errors.create_entries.clear();
    let second = fold_experience_errors(&exp.entries.items, &exp.definitions, &errors);

    assert_eq!(first.entries.len(), 1);
    assert!(second.entries.is_empty());
}

#[test]
fn own_fields_and_definition_errors_fold_with_positions() {
    let (exp, _) = experience_with_entries(0);
    let mut errors = ExperienceSyncErrors::default();
    errors.own_fields = Some(OwnFieldsError {
        title: Some("has already been taken".into()),
    });
    errors.definitions.insert(
        exp.definitions[0].id.clone(),
        DefinitionError::general(exp.definitions[0].id.clone(), "is invalid"),
    );

    let displayed = fold_experience_errors(&exp.entries.items, &exp.definitions, &errors);
    assert_eq!(
        displayed.experience,
        vec![("title".to_string(), "has already been taken".to_string())]
    );
    assert_eq!(displayed.definitions.len(), 1);
    assert_eq!(displayed.definitions[0].index, 1);
}

#[test]
fn aggregate_is_empty_only_when_everything_cleared() {
    let mut errors = ExperienceSyncErrors::default();
    assert!(errors.is_empty());

    errors.own_fields = Some(OwnFieldsError {
        title: Some("bad".into()),
    });
    assert!(!errors.is_empty());

    errors.own_fields = None;
    assert!(errors.is_empty());
}
