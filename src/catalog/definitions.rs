//! Dimensional model of the processing plant
//!
//! Queries only select and join. Sentinels, time keys, ordinal fact keys,
//! durations and the audit stamp are [`Transform`] steps so each rule has a
//! single implementation.

use super::{Transform, TransformationDefinition};
use crate::models::OutputColumn;

/// Foreign key column shared by every fact and the time dimension
pub const TIME_KEY_COLUMN: &str = "TiempoKey";

/// Audit column stamped with the run's load time
pub const AUDIT_COLUMN: &str = "FechaRegistro";

fn surrogate(source: &str, target: &str) -> Transform {
    Transform::SurrogateKey {
        source: source.to_string(),
        target: target.to_string(),
    }
}

fn unknown_key(column: &str) -> Transform {
    Transform::UnknownKey {
        column: column.to_string(),
    }
}

fn unknown_label(column: &str, noun: &'static str) -> Transform {
    Transform::UnknownLabel {
        column: column.to_string(),
        noun,
    }
}

fn zero(column: &str) -> Transform {
    Transform::ZeroMeasure {
        column: column.to_string(),
    }
}

fn time_key(source: &str) -> Transform {
    Transform::TimeKey {
        source: source.to_string(),
        target: TIME_KEY_COLUMN.to_string(),
    }
}

fn ordinal(target: &str, order_by: &str) -> Transform {
    Transform::OrdinalKey {
        target: target.to_string(),
        order_by: vec![order_by.to_string()],
    }
}

fn audit() -> Transform {
    Transform::AuditTimestamp {
        target: AUDIT_COLUMN.to_string(),
    }
}

/// Add the steps common to every fact: unknown keys for each dimension
/// reference and the audit stamp
fn fact_refs(mut def: TransformationDefinition, refs: &[(&str, &str)]) -> TransformationDefinition {
    for (column, dimension) in refs {
        def = def.step(unknown_key(column)).references(column, dimension);
    }
    def.step(audit())
}

fn dim_tiempo() -> TransformationDefinition {
    TransformationDefinition::dimension(
        "DimTiempo",
        "SELECT fechaInicio AS Fecha FROM {schema}Proceso \
         UNION ALL SELECT fechaInicio FROM {schema}ParadaNoProgramada \
         UNION ALL SELECT fechaInicio FROM {schema}ProcesoEmpaque",
    )
    .step(Transform::TimeDimension {
        source: "Fecha".to_string(),
    })
    .columns(vec![
        OutputColumn::int(TIME_KEY_COLUMN),
        OutputColumn::datetime("Fecha"),
        OutputColumn::int("Anio"),
        OutputColumn::string("Mes"),
        OutputColumn::string("Dia"),
        OutputColumn::time("Hora"),
    ])
}

fn dim_turno() -> TransformationDefinition {
    TransformationDefinition::dimension(
        "DimTurno",
        "SELECT idTurno, turno AS Turno FROM {schema}Turno",
    )
    .step(surrogate("idTurno", "TurnoKey"))
    .columns(vec![
        OutputColumn::int("TurnoKey"),
        OutputColumn::int("idTurno"),
        OutputColumn::string("Turno"),
    ])
}

fn dim_produccion() -> TransformationDefinition {
    TransformationDefinition::dimension(
        "DimProduccion",
        "SELECT e.idEtapa, e.nombre AS Etapa, tp.tipoProduccion AS Tipo \
         FROM {schema}Etapa e \
         LEFT JOIN {schema}TipoProduccion tp ON e.idTipoProduccion = tp.idTipoProduccion",
    )
    .step(surrogate("idEtapa", "ProduccionKey"))
    .step(unknown_label("Tipo", "Tipo"))
    .columns(vec![
        OutputColumn::int("ProduccionKey"),
        OutputColumn::int("idEtapa"),
        OutputColumn::string("Etapa"),
        OutputColumn::string("Tipo"),
    ])
}

fn dim_empleado() -> TransformationDefinition {
    TransformationDefinition::dimension(
        "DimEmpleado",
        "SELECT e.idEmpleado, e.dni AS DNI, e.nombres, e.apellidoPaterno, e.apellidoMaterno, \
         c.fechaInicio AS fechaContrato \
         FROM {schema}Empleado e \
         LEFT JOIN (SELECT idEmpleado, MIN(fechaInicio) AS fechaInicio \
         FROM {schema}Contrato GROUP BY idEmpleado) c ON e.idEmpleado = c.idEmpleado",
    )
    .step(surrogate("idEmpleado", "EmpleadoKey"))
    .step(Transform::Concat {
        sources: vec![
            "nombres".to_string(),
            "apellidoPaterno".to_string(),
            "apellidoMaterno".to_string(),
        ],
        separator: " ".to_string(),
        target: "NombreCompleto".to_string(),
    })
    .step(unknown_label("NombreCompleto", "Nombre"))
    .step(Transform::YearsSince {
        source: "fechaContrato".to_string(),
        target: "AntiguedadAnios".to_string(),
    })
    .step(zero("AntiguedadAnios"))
    .columns(vec![
        OutputColumn::int("EmpleadoKey"),
        OutputColumn::int("idEmpleado"),
        OutputColumn::string("DNI"),
        OutputColumn::string("NombreCompleto"),
        OutputColumn::string("apellidoPaterno"),
        OutputColumn::string("apellidoMaterno"),
        OutputColumn::int("AntiguedadAnios"),
    ])
}

fn dim_organizacion() -> TransformationDefinition {
    TransformationDefinition::dimension(
        "DimOrganizacion",
        "SELECT p.idPlanta, p.planta AS Planta, s.sucursal AS Sucursal \
         FROM {schema}Planta p \
         LEFT JOIN {schema}Sucursal s ON p.idSucursal = s.idSucursal",
    )
    .step(surrogate("idPlanta", "OrganizacionKey"))
    .step(unknown_label("Planta", "Nombre"))
    .step(unknown_label("Sucursal", "Sucursal"))
    .columns(vec![
        OutputColumn::int("OrganizacionKey"),
        OutputColumn::int("idPlanta"),
        OutputColumn::string("Planta"),
        OutputColumn::string("Sucursal"),
    ])
}

fn dim_producto() -> TransformationDefinition {
    TransformationDefinition::dimension(
        "DimProducto",
        "SELECT e.idEspecie, e.especie AS Especie, p.producto AS Producto, \
         CAST(e.tiempoIdealEmpaqueCongelado AS DOUBLE PRECISION) AS tiempoIdealEmpaque \
         FROM {schema}Especie e \
         LEFT JOIN {schema}Producto p ON e.idProducto = p.idProducto",
    )
    .step(surrogate("idEspecie", "ProductoKey"))
    .step(unknown_label("Producto", "Producto Base"))
    .columns(vec![
        OutputColumn::int("ProductoKey"),
        OutputColumn::int("idEspecie"),
        OutputColumn::string("Especie"),
        OutputColumn::string("Producto"),
        OutputColumn::float("tiempoIdealEmpaque"),
    ])
}

fn dim_causa_parada() -> TransformationDefinition {
    TransformationDefinition::dimension(
        "DimCausaParada",
        "SELECT idCausa, causa AS Causa FROM {schema}CausaParada",
    )
    .step(surrogate("idCausa", "CausaKey"))
    .columns(vec![
        OutputColumn::int("CausaKey"),
        OutputColumn::int("idCausa"),
        OutputColumn::string("Causa"),
    ])
}

fn dim_merma_lean() -> TransformationDefinition {
    TransformationDefinition::dimension(
        "DimMermaLean",
        "SELECT idMermaLean, mermaLean AS NombreMermaLean FROM {schema}MermaLean",
    )
    .step(surrogate("idMermaLean", "MermaLeanKey"))
    .columns(vec![
        OutputColumn::int("MermaLeanKey"),
        OutputColumn::int("idMermaLean"),
        OutputColumn::string("NombreMermaLean"),
    ])
}

fn hecho_produccion_merma() -> TransformationDefinition {
    let def = TransformationDefinition::fact(
        "HechoProduccionMerma",
        "SELECT p.idProceso, ps.idProcesoSalida, p.fechaInicio, p.fechaFin, \
         p.idTurno AS TurnoKey, p.idEtapa AS ProduccionKey, p.idEmpleado AS EmpleadoKey, \
         l.idPlanta AS OrganizacionKey, l.idEspecie AS ProductoKey, \
         dm.idMermaLean AS MermaLeanKey, \
         CAST(pe.pesoIngresado AS DOUBLE PRECISION) AS PesoIngresado, \
         CAST(ps.pesoSalida AS DOUBLE PRECISION) AS PesoSalida, \
         pe.cantidadMallas AS CantidadMallas, \
         CAST(ps.pesoMerma AS DOUBLE PRECISION) AS PesoMerma \
         FROM {schema}Proceso p \
         LEFT JOIN {schema}ProcesoEntrada pe ON p.idProceso = pe.idProceso \
         LEFT JOIN {schema}ProcesoSalida ps ON p.idProceso = ps.idProceso \
         LEFT JOIN {schema}Lote l ON p.idLote = l.idLote \
         LEFT JOIN {schema}DetalleMerma dm ON ps.idProcesoSalida = dm.idProcesoSalida",
    )
    .step(ordinal("ProduccionMermaKey", "idProceso"))
    .step(time_key("fechaInicio"))
    .step(zero("PesoIngresado"))
    .step(zero("PesoSalida"))
    .step(zero("CantidadMallas"))
    .step(zero("PesoMerma"))
    .step(Transform::MinutesBetween {
        start: "fechaInicio".to_string(),
        end: "fechaFin".to_string(),
        target: "DuracionProcesamiento".to_string(),
    })
    .step(zero("DuracionProcesamiento"));

    fact_refs(
        def.references(TIME_KEY_COLUMN, "DimTiempo"),
        &[
            ("TurnoKey", "DimTurno"),
            ("ProduccionKey", "DimProduccion"),
            ("EmpleadoKey", "DimEmpleado"),
            ("OrganizacionKey", "DimOrganizacion"),
            ("ProductoKey", "DimProducto"),
            ("MermaLeanKey", "DimMermaLean"),
        ],
    )
    .columns(vec![
        OutputColumn::int("ProduccionMermaKey"),
        OutputColumn::int(TIME_KEY_COLUMN),
        OutputColumn::int("TurnoKey"),
        OutputColumn::int("ProduccionKey"),
        OutputColumn::int("EmpleadoKey"),
        OutputColumn::int("OrganizacionKey"),
        OutputColumn::int("ProductoKey"),
        OutputColumn::int("MermaLeanKey"),
        OutputColumn::float("PesoIngresado"),
        OutputColumn::float("PesoSalida"),
        OutputColumn::int("CantidadMallas"),
        OutputColumn::float("PesoMerma"),
        OutputColumn::float("DuracionProcesamiento"),
        OutputColumn::int("idProceso"),
        OutputColumn::int("idProcesoSalida"),
        OutputColumn::datetime(AUDIT_COLUMN),
    ])
}

fn hecho_paradas() -> TransformationDefinition {
    let def = TransformationDefinition::fact(
        "HechoParadas",
        "SELECT pnp.idParada, pnp.idProceso, pnp.idProcesoEmpaque, pnp.fechaInicio, \
         pnp.idTurno AS TurnoKey, pnp.idCausa AS CausaKey, p.idEtapa AS ProduccionKey, \
         l.idEspecie AS ProductoKey, l.idPlanta AS OrganizacionKey, \
         pnp.idMermaLean AS MermaLeanKey, \
         CAST(pnp.duracionMinutos AS DOUBLE PRECISION) AS TotalDuracionParada, \
         1 AS NumeroParadas, t.horaInicio, t.horaFin \
         FROM {schema}ParadaNoProgramada pnp \
         LEFT JOIN {schema}Proceso p ON pnp.idProceso = p.idProceso \
         LEFT JOIN {schema}Lote l ON p.idLote = l.idLote \
         LEFT JOIN {schema}Turno t ON pnp.idTurno = t.idTurno",
    )
    .step(ordinal("ParadaKey", "idParada"))
    .step(time_key("fechaInicio"))
    .step(zero("TotalDuracionParada"))
    .step(Transform::ShiftMinutes {
        start: "horaInicio".to_string(),
        end: "horaFin".to_string(),
        target: "DuracionTurno".to_string(),
    })
    .step(zero("DuracionTurno"));

    fact_refs(
        def.references(TIME_KEY_COLUMN, "DimTiempo"),
        &[
            ("TurnoKey", "DimTurno"),
            ("CausaKey", "DimCausaParada"),
            ("ProduccionKey", "DimProduccion"),
            ("ProductoKey", "DimProducto"),
            ("OrganizacionKey", "DimOrganizacion"),
            ("MermaLeanKey", "DimMermaLean"),
        ],
    )
    .columns(vec![
        OutputColumn::int("ParadaKey"),
        OutputColumn::int(TIME_KEY_COLUMN),
        OutputColumn::int("TurnoKey"),
        OutputColumn::int("CausaKey"),
        OutputColumn::int("ProduccionKey"),
        OutputColumn::int("ProductoKey"),
        OutputColumn::int("OrganizacionKey"),
        OutputColumn::int("MermaLeanKey"),
        OutputColumn::float("TotalDuracionParada"),
        OutputColumn::int("NumeroParadas"),
        OutputColumn::int("DuracionTurno"),
        OutputColumn::int("idParada"),
        OutputColumn::int("idProceso"),
        OutputColumn::int("idProcesoEmpaque"),
        OutputColumn::datetime(AUDIT_COLUMN),
    ])
}

fn hecho_calidad_empaque() -> TransformationDefinition {
    let def = TransformationDefinition::fact(
        "HechoCalidadEmpaque",
        "SELECT pe.idProcesoEmpaque, pe.fechaInicio, \
         p.idTurno AS TurnoKey, pe.idEmpleado AS EmpleadoKey, \
         l.idPlanta AS OrganizacionKey, l.idEspecie AS ProductoKey, \
         pe.idMermaLean AS MermaLeanKey, pe.productosCorrectos AS ProductosCorrectos \
         FROM {schema}ProcesoEmpaque pe \
         INNER JOIN {schema}Empleado e ON pe.idEmpleado = e.idEmpleado \
         INNER JOIN {schema}Puesto pu ON e.idPuesto = pu.idPuesto \
         LEFT JOIN {schema}ProcesoSalida ps ON pe.idProcesoSalida = ps.idProcesoSalida \
         LEFT JOIN {schema}Proceso p ON ps.idProceso = p.idProceso \
         LEFT JOIN {schema}Lote l ON p.idLote = l.idLote \
         WHERE pu.tipoPuesto = 'Operario de Etiquetado y Empaque'",
    )
    .step(ordinal("CalidadEmpaqueKey", "idProcesoEmpaque"))
    .step(time_key("fechaInicio"))
    .step(zero("ProductosCorrectos"));

    fact_refs(
        def.references(TIME_KEY_COLUMN, "DimTiempo"),
        &[
            ("TurnoKey", "DimTurno"),
            ("EmpleadoKey", "DimEmpleado"),
            ("OrganizacionKey", "DimOrganizacion"),
            ("ProductoKey", "DimProducto"),
            ("MermaLeanKey", "DimMermaLean"),
        ],
    )
    .columns(vec![
        OutputColumn::int("CalidadEmpaqueKey"),
        OutputColumn::int(TIME_KEY_COLUMN),
        OutputColumn::int("TurnoKey"),
        OutputColumn::int("EmpleadoKey"),
        OutputColumn::int("OrganizacionKey"),
        OutputColumn::int("ProductoKey"),
        OutputColumn::int("MermaLeanKey"),
        OutputColumn::int("ProductosCorrectos"),
        OutputColumn::int("idProcesoEmpaque"),
        OutputColumn::datetime(AUDIT_COLUMN),
    ])
}

/// Built-in definitions, dimensions first
pub fn builtin_definitions() -> Vec<TransformationDefinition> {
    vec![
        dim_tiempo(),
        dim_turno(),
        dim_produccion(),
        dim_empleado(),
        dim_organizacion(),
        dim_producto(),
        dim_causa_parada(),
        dim_merma_lean(),
        hecho_produccion_merma(),
        hecho_paradas(),
        hecho_calidad_empaque(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{EntityKind, Locale, TransformContext, validate_definition};
    use crate::models::{ResultSet, Scalar};
    use chrono::NaiveDateTime;

    fn ts(s: &str) -> Scalar {
        Scalar::Timestamp(NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").unwrap())
    }

    fn ctx() -> TransformContext {
        TransformContext::new(
            NaiveDateTime::parse_from_str("2025-03-01 06:00:00", "%Y-%m-%d %H:%M:%S").unwrap(),
            Locale::Es,
        )
    }

    #[test]
    fn test_builtin_definitions_validate() {
        let defs = builtin_definitions();
        assert_eq!(defs.len(), 11);
        for def in &defs {
            validate_definition(def).unwrap();
        }
        // Dimensions load before the facts that reference them
        let first_fact = defs.iter().position(|d| d.kind() == EntityKind::Fact).unwrap();
        assert!(defs[first_fact..].iter().all(|d| d.kind() == EntityKind::Fact));
    }

    #[test]
    fn test_fact_references_point_at_builtin_dimensions() {
        let defs = builtin_definitions();
        for def in defs.iter().filter(|d| d.kind() == EntityKind::Fact) {
            assert!(!def.dimension_refs().is_empty());
            for r in def.dimension_refs() {
                assert!(defs.iter().any(|d| d.name() == r.dimension), "{}", r.dimension);
                assert!(def.output_columns().iter().any(|c| c.name == r.column));
            }
        }
    }

    #[test]
    fn test_dim_produccion_sentinel() {
        let raw = ResultSet::from_rows(
            &["idEtapa", "Etapa", "Tipo"],
            vec![
                vec![Scalar::Int(1), Scalar::from("Fileteo"), Scalar::Null],
                vec![Scalar::Int(2), Scalar::from("Congelado"), Scalar::from("IQF")],
            ],
        );
        let out = dim_produccion().apply(raw, &ctx()).unwrap();
        assert_eq!(out.columns, vec!["ProduccionKey", "idEtapa", "Etapa", "Tipo"]);
        assert_eq!(out.value(0, "Tipo"), Some(&Scalar::from("Sin Tipo")));
        assert_eq!(out.value(1, "ProduccionKey"), Some(&Scalar::Int(2)));
    }

    #[test]
    fn test_dim_empleado_name_and_seniority() {
        let raw = ResultSet::from_rows(
            &["idEmpleado", "DNI", "nombres", "apellidoPaterno", "apellidoMaterno", "fechaContrato"],
            vec![vec![
                Scalar::Int(7),
                Scalar::from("44556677"),
                Scalar::from("Rosa"),
                Scalar::from("Huaman"),
                Scalar::from("Rojas"),
                ts("2020-05-04 00:00:00"),
            ]],
        );
        let out = dim_empleado().apply(raw, &ctx()).unwrap();
        assert_eq!(
            out.value(0, "NombreCompleto"),
            Some(&Scalar::from("Rosa Huaman Rojas"))
        );
        assert_eq!(out.value(0, "AntiguedadAnios"), Some(&Scalar::Int(5)));
    }

    #[test]
    fn test_hecho_paradas_applies_sentinels() {
        let raw = ResultSet::from_rows(
            &[
                "idParada",
                "idProceso",
                "idProcesoEmpaque",
                "fechaInicio",
                "TurnoKey",
                "CausaKey",
                "ProduccionKey",
                "ProductoKey",
                "OrganizacionKey",
                "MermaLeanKey",
                "TotalDuracionParada",
                "NumeroParadas",
                "horaInicio",
                "horaFin",
            ],
            vec![vec![
                Scalar::Int(9),
                Scalar::Null,
                Scalar::Int(3),
                ts("2024-01-01 08:00:00.900"),
                Scalar::Int(1),
                Scalar::Int(2),
                Scalar::Null,
                Scalar::Null,
                Scalar::Null,
                Scalar::Null,
                Scalar::Null,
                Scalar::Int(1),
                Scalar::Null,
                Scalar::Null,
            ]],
        );
        let out = hecho_paradas().apply(raw, &ctx()).unwrap();
        assert_eq!(out.value(0, "ParadaKey"), Some(&Scalar::Int(1)));
        assert_eq!(out.value(0, TIME_KEY_COLUMN), Some(&Scalar::Int(20240101080000)));
        assert_eq!(out.value(0, "ProduccionKey"), Some(&Scalar::Int(-1)));
        assert_eq!(out.value(0, "MermaLeanKey"), Some(&Scalar::Int(-1)));
        assert_eq!(out.value(0, "TotalDuracionParada"), Some(&Scalar::Int(0)));
        assert_eq!(out.value(0, "DuracionTurno"), Some(&Scalar::Int(0)));
        assert_eq!(
            out.value(0, AUDIT_COLUMN),
            Some(&Scalar::Timestamp(ctx().loaded_at))
        );
    }

    #[test]
    fn test_dim_empleado_without_contract() {
        let raw = ResultSet::from_rows(
            &["idEmpleado", "DNI", "nombres", "apellidoPaterno", "apellidoMaterno", "fechaContrato"],
            vec![vec![
                Scalar::Int(8),
                Scalar::Null,
                Scalar::Null,
                Scalar::Null,
                Scalar::Null,
                Scalar::Null,
            ]],
        );
        let out = dim_empleado().apply(raw, &ctx()).unwrap();
        assert_eq!(out.value(0, "NombreCompleto"), Some(&Scalar::from("Sin Nombre")));
        assert_eq!(out.value(0, "AntiguedadAnios"), Some(&Scalar::Int(0)));
    }

    #[test]
    fn test_hecho_produccion_merma_open_process() {
        let raw = ResultSet::from_rows(
            &[
                "idProceso",
                "idProcesoSalida",
                "fechaInicio",
                "fechaFin",
                "TurnoKey",
                "ProduccionKey",
                "EmpleadoKey",
                "OrganizacionKey",
                "ProductoKey",
                "MermaLeanKey",
                "PesoIngresado",
                "PesoSalida",
                "CantidadMallas",
                "PesoMerma",
            ],
            vec![
                vec![
                    Scalar::Int(5),
                    Scalar::Null,
                    ts("2024-01-01 08:00:30"),
                    Scalar::Null,
                    Scalar::Int(1),
                    Scalar::Int(2),
                    Scalar::Null,
                    Scalar::Null,
                    Scalar::Null,
                    Scalar::Null,
                    Scalar::Float(120.0),
                    Scalar::Null,
                    Scalar::Null,
                    Scalar::Null,
                ],
                vec![
                    Scalar::Int(4),
                    Scalar::Int(11),
                    ts("2024-01-01 07:00:50"),
                    ts("2024-01-01 07:45:10"),
                    Scalar::Int(1),
                    Scalar::Int(2),
                    Scalar::Int(7),
                    Scalar::Int(3),
                    Scalar::Int(1),
                    Scalar::Null,
                    Scalar::Float(80.0),
                    Scalar::Float(75.5),
                    Scalar::Int(4),
                    Scalar::Float(4.5),
                ],
            ],
        );
        let out = hecho_produccion_merma().apply(raw, &ctx()).unwrap();

        // Ordered by idProceso
        assert_eq!(out.value(0, "idProceso"), Some(&Scalar::Int(4)));
        assert_eq!(out.value(0, "DuracionProcesamiento"), Some(&Scalar::Float(45.0)));
        assert_eq!(out.value(1, "ProduccionMermaKey"), Some(&Scalar::Int(2)));
        assert_eq!(out.value(1, "DuracionProcesamiento"), Some(&Scalar::Int(0)));
        assert_eq!(out.value(1, "PesoSalida"), Some(&Scalar::Int(0)));
        assert_eq!(out.value(1, "EmpleadoKey"), Some(&Scalar::Int(-1)));

        let measures = [
            "PesoIngresado",
            "PesoSalida",
            "CantidadMallas",
            "PesoMerma",
            "DuracionProcesamiento",
        ];
        for row in 0..out.row_count() {
            for measure in measures {
                assert!(!out.value(row, measure).unwrap().is_null(), "{} is null", measure);
            }
        }
    }
}
