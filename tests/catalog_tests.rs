//! Tests for the built-in catalog and definition validation

use chrono::NaiveDateTime;
use warehouse_etl::catalog::{
    EntityKind, Locale, QueryCatalog, TIME_DIMENSION_COLUMNS, TransformContext,
    TransformationDefinition, validate_query,
};
use warehouse_etl::keys::normalize_time;
use warehouse_etl::{EtlError, OutputColumn, ResultSet, Scalar};

fn ts(s: &str) -> Scalar {
    Scalar::Timestamp(NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").unwrap())
}

fn ctx(locale: Locale) -> TransformContext {
    TransformContext::new(
        NaiveDateTime::parse_from_str("2025-01-15 03:00:00", "%Y-%m-%d %H:%M:%S").unwrap(),
        locale,
    )
}

#[test]
fn test_builtin_catalog_order() {
    let catalog = QueryCatalog::builtin();
    assert_eq!(
        catalog.names(),
        vec![
            "DimTiempo",
            "DimTurno",
            "DimProduccion",
            "DimEmpleado",
            "DimOrganizacion",
            "DimProducto",
            "DimCausaParada",
            "DimMermaLean",
            "HechoProduccionMerma",
            "HechoParadas",
            "HechoCalidadEmpaque",
        ]
    );
    assert_eq!(
        catalog.iter().filter(|d| d.kind() == EntityKind::Fact).count(),
        3
    );
}

#[test]
fn test_builtin_catalog_passes_validation() {
    let definitions: Vec<TransformationDefinition> =
        QueryCatalog::builtin().iter().cloned().collect();
    let catalog = QueryCatalog::new(definitions).unwrap();
    assert_eq!(catalog.len(), 11);
}

#[test]
fn test_select_keeps_catalog_order() {
    let catalog = QueryCatalog::builtin();
    let selected = catalog
        .select(&["HechoParadas".to_string(), "DimTiempo".to_string()])
        .unwrap();
    assert_eq!(selected.names(), vec!["DimTiempo", "HechoParadas"]);
}

#[test]
fn test_select_rejects_unknown_entity() {
    let err = QueryCatalog::builtin()
        .select(&["DimClima".to_string()])
        .unwrap_err();
    assert!(matches!(err, EtlError::Config(_)));
    assert!(err.is_fatal());
}

#[test]
fn test_duplicate_entity_is_rejected() {
    let def = TransformationDefinition::dimension("DimTurno", "SELECT idTurno FROM Turno")
        .columns(vec![OutputColumn::int("idTurno")]);
    let err = QueryCatalog::new(vec![def.clone(), def]).unwrap_err();
    assert!(err.to_string().contains("duplicate"));
}

#[test]
fn test_write_statements_are_rejected() {
    assert!(validate_query("SELECT 1").is_ok());
    assert!(validate_query("DELETE FROM Turno").is_err());
    assert!(validate_query("SELECT 1; DROP TABLE Turno").is_err());
    assert!(validate_query("SELECT * INTO copia FROM Turno").is_err());

    let def = TransformationDefinition::dimension("DimTurno", "TRUNCATE TABLE {schema}Turno")
        .columns(vec![OutputColumn::int("idTurno")]);
    assert!(QueryCatalog::new(vec![def]).is_err());
}

#[test]
fn test_schema_qualifier_is_rendered() {
    let catalog = QueryCatalog::builtin();
    let turno = catalog.get("DimTurno").unwrap();
    assert_eq!(
        turno.render_query(Some("dbo")),
        "SELECT idTurno, turno AS Turno FROM dbo.Turno"
    );
    assert_eq!(
        turno.render_query(None),
        "SELECT idTurno, turno AS Turno FROM Turno"
    );
}

#[test]
fn test_time_dimension_collapses_subsecond_timestamps() {
    let catalog = QueryCatalog::builtin();
    let tiempo = catalog.get("DimTiempo").unwrap();
    let raw = ResultSet::from_rows(
        &["Fecha"],
        vec![
            vec![ts("2024-01-01 08:00:00.900")],
            vec![Scalar::Null],
            vec![ts("2024-01-01 08:00:00.500")],
            vec![ts("2024-01-01 08:00:01.000")],
        ],
    );

    let out = tiempo.apply(raw, &ctx(Locale::Es)).unwrap();
    assert_eq!(out.columns, TIME_DIMENSION_COLUMNS.to_vec());
    assert_eq!(out.row_count(), 2);
    assert_eq!(out.value(0, "TiempoKey"), Some(&Scalar::Int(20240101080000)));
    assert_eq!(out.value(1, "TiempoKey"), Some(&Scalar::Int(20240101080001)));
    assert_eq!(out.value(0, "Mes"), Some(&Scalar::from("Enero")));
    assert_eq!(out.value(0, "Dia"), Some(&Scalar::from("Lunes")));

    let key = normalize_time(&ts("2024-01-01 08:00:00.999")).unwrap();
    assert_eq!(key.value(), 20240101080000);
}

#[test]
fn test_time_dimension_english_names() {
    let catalog = QueryCatalog::builtin();
    let raw = ResultSet::from_rows(&["Fecha"], vec![vec![ts("2024-01-01 08:00:00")]]);
    let out = catalog
        .get("DimTiempo")
        .unwrap()
        .apply(raw, &ctx(Locale::En))
        .unwrap();
    assert_eq!(out.value(0, "Mes"), Some(&Scalar::from("January")));
    assert_eq!(out.value(0, "Dia"), Some(&Scalar::from("Monday")));
}

#[test]
fn test_dimension_with_reserved_key_fails() {
    let catalog = QueryCatalog::builtin();
    let raw = ResultSet::from_rows(
        &["idTurno", "Turno"],
        vec![vec![Scalar::Int(-1), Scalar::from("Fantasma")]],
    );
    let err = catalog
        .get("DimTurno")
        .unwrap()
        .apply(raw, &ctx(Locale::Es))
        .unwrap_err();
    assert!(matches!(err, EtlError::Transform { .. }));
}

#[test]
fn test_organizacion_unknown_labels() {
    let catalog = QueryCatalog::builtin();
    let raw = ResultSet::from_rows(
        &["idPlanta", "Planta", "Sucursal"],
        vec![vec![Scalar::Int(3), Scalar::Null, Scalar::Null]],
    );
    let out = catalog
        .get("DimOrganizacion")
        .unwrap()
        .apply(raw, &ctx(Locale::Es))
        .unwrap();
    assert_eq!(out.value(0, "Planta"), Some(&Scalar::from("Sin Nombre")));
    assert_eq!(out.value(0, "Sucursal"), Some(&Scalar::from("Sin Sucursal")));
}
