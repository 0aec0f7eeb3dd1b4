//! SurrealDB implementation of [`CertificateRepository`].
//!
//! Certificates are immutable: there is no update. The subject
//! configuration is stored as a flexible object.

use chrono::{DateTime, Utc};
use kiln_core::error::KilnResult;
use kiln_core::models::certificate::{
    Certificate, CertificateConfig, CertificateFilter, CertificateType, CreateCertificate,
};
use kiln_core::repository::{CertificateRepository, PaginatedResult, Pagination};
use kiln_core::well_known::{GLOBAL_ROOT_CERTIFICATE_ID, GLOBAL_TENANT_ID};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{CountRow, decode_enum, parse_uuid};
use crate::error::DbError;
use crate::transaction::{self, Undo};

#[derive(Debug, SurrealValue)]
struct CertificateRow {
    record_id: String,
    tenant_id: String,
    certificate_type: String,
    name: String,
    slug: String,
    config: serde_json::Value,
    serial_number: String,
    pem_certificate: String,
    pem_private_key: String,
    pem_csr: String,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl CertificateRow {
    fn try_into_certificate(self) -> Result<Certificate, DbError> {
        let config: CertificateConfig = serde_json::from_value(self.config)
            .map_err(|e| DbError::Decode(format!("invalid certificate config: {e}")))?;
        Ok(Certificate {
            id: parse_uuid(&self.record_id, "certificate")?,
            tenant_id: parse_uuid(&self.tenant_id, "tenant")?,
            certificate_type: decode_enum(
                &self.certificate_type,
                "certificate type",
                CertificateType::parse,
            )?,
            name: self.name,
            slug: self.slug,
            config,
            serial_number: self.serial_number,
            pem_certificate: self.pem_certificate,
            pem_private_key: self.pem_private_key,
            pem_csr: self.pem_csr,
            not_before: self.not_before,
            not_after: self.not_after,
            created_at: self.created_at,
        })
    }
}

const SELECT_CERTIFICATE: &str = "SELECT meta::id(id) AS record_id, * FROM certificate";

pub(crate) async fn write<C: Connection>(
    db: &Surreal<C>,
    verb: &str,
    certificate: &Certificate,
) -> Result<(), DbError> {
    let config = serde_json::to_value(&certificate.config)
        .map_err(|e| DbError::Decode(format!("unserializable certificate config: {e}")))?;
    let query = format!(
        "{verb} type::record('certificate', $id) SET \
         tenant_id = $tenant_id, certificate_type = $certificate_type, \
         name = $name, slug = $slug, config = $config, \
         serial_number = $serial_number, \
         pem_certificate = $pem_certificate, \
         pem_private_key = $pem_private_key, pem_csr = $pem_csr, \
         not_before = $not_before, not_after = $not_after, \
         created_at = $created_at"
    );

    db.query(&query)
        .bind(("id", certificate.id.to_string()))
        .bind(("tenant_id", certificate.tenant_id.to_string()))
        .bind(("certificate_type", certificate.certificate_type.as_str()))
        .bind(("name", certificate.name.clone()))
        .bind(("slug", certificate.slug.clone()))
        .bind(("config", config))
        .bind(("serial_number", certificate.serial_number.clone()))
        .bind(("pem_certificate", certificate.pem_certificate.clone()))
        .bind(("pem_private_key", certificate.pem_private_key.clone()))
        .bind(("pem_csr", certificate.pem_csr.clone()))
        .bind(("not_before", certificate.not_before))
        .bind(("not_after", certificate.not_after))
        .bind(("created_at", certificate.created_at))
        .await
        .map_err(DbError::from_query)?
        .check()
        .map_err(DbError::from_query)?;

    Ok(())
}

pub(crate) async fn fetch_by_tenant<C: Connection>(
    db: &Surreal<C>,
    tenant_id: Uuid,
) -> Result<Vec<Certificate>, DbError> {
    let mut result = db
        .query(format!("{SELECT_CERTIFICATE} WHERE tenant_id = $tenant_id"))
        .bind(("tenant_id", tenant_id.to_string()))
        .await?;
    let rows: Vec<CertificateRow> = result.take(0)?;
    rows.into_iter()
        .map(CertificateRow::try_into_certificate)
        .collect()
}

/// SurrealDB implementation of the Certificate repository.
pub struct SurrealCertificateRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> Clone for SurrealCertificateRepository<C> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}

impl<C: Connection> SurrealCertificateRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> CertificateRepository for SurrealCertificateRepository<C> {
    async fn create(&self, input: CreateCertificate) -> KilnResult<Certificate> {
        let certificate = Certificate {
            id: input.id.unwrap_or_else(Uuid::new_v4),
            tenant_id: input.tenant_id,
            certificate_type: input.certificate_type,
            name: input.name,
            slug: input.slug,
            config: input.config,
            serial_number: input.serial_number,
            pem_certificate: input.pem_certificate,
            pem_private_key: input.pem_private_key,
            pem_csr: input.pem_csr,
            not_before: input.not_before,
            not_after: input.not_after,
            created_at: Utc::now(),
        };

        write(&self.db, "CREATE", &certificate).await?;
        transaction::record(Undo::Delete {
            table: "certificate",
            id: certificate.id.to_string(),
        });

        Ok(certificate)
    }

    async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> KilnResult<Certificate> {
        let mut result = self
            .db
            .query(format!(
                "{SELECT_CERTIFICATE} WHERE id = type::record('certificate', $id) \
                 AND tenant_id = $tenant_id"
            ))
            .bind(("id", id.to_string()))
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CertificateRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("certificate", id))?;
        Ok(row.try_into_certificate()?)
    }

    async fn get_by_slug(&self, tenant_id: Uuid, slug: &str) -> KilnResult<Certificate> {
        let mut result = self
            .db
            .query(format!(
                "{SELECT_CERTIFICATE} WHERE tenant_id = $tenant_id AND slug = $slug"
            ))
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("slug", slug.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CertificateRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("certificate", format!("slug={slug}")))?;
        Ok(row.try_into_certificate()?)
    }

    async fn get_by_type(
        &self,
        tenant_id: Uuid,
        certificate_type: CertificateType,
    ) -> KilnResult<Vec<Certificate>> {
        let mut result = self
            .db
            .query(format!(
                "{SELECT_CERTIFICATE} WHERE tenant_id = $tenant_id \
                 AND certificate_type = $certificate_type ORDER BY created_at ASC"
            ))
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("certificate_type", certificate_type.as_str()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CertificateRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(CertificateRow::try_into_certificate)
            .collect::<Result<Vec<_>, DbError>>()?)
    }

    async fn get_root(&self) -> KilnResult<Certificate> {
        self.get_by_id(GLOBAL_TENANT_ID, GLOBAL_ROOT_CERTIFICATE_ID)
            .await
    }

    async fn serial_exists(&self, serial_number: &str) -> KilnResult<bool> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM certificate \
                 WHERE serial_number = $serial_number GROUP ALL",
            )
            .bind(("serial_number", serial_number.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().is_some_and(|r| r.total > 0))
    }

    async fn delete(&self, tenant_id: Uuid, id: Uuid) -> KilnResult<()> {
        let certificate = self.get_by_id(tenant_id, id).await?;

        self.db
            .query("DELETE type::record('certificate', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::from_query)?;

        transaction::record(Undo::Certificate(Box::new(certificate)));
        Ok(())
    }

    async fn list(
        &self,
        filter: CertificateFilter,
        pagination: Pagination,
    ) -> KilnResult<PaginatedResult<Certificate>> {
        let mut conditions = Vec::new();
        if filter.tenant_id.is_some() {
            conditions.push("tenant_id = $tenant_id");
        }
        if filter.certificate_type.is_some() {
            conditions.push("certificate_type = $certificate_type");
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let tenant_id = filter.tenant_id.map(|id| id.to_string());
        let certificate_type = filter.certificate_type.map(CertificateType::as_str);

        let mut count_result = self
            .db
            .query(format!(
                "SELECT count() AS total FROM certificate {where_clause} GROUP ALL"
            ))
            .bind(("tenant_id", tenant_id.clone()))
            .bind(("certificate_type", certificate_type))
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let mut result = self
            .db
            .query(format!(
                "{SELECT_CERTIFICATE} {where_clause} \
                 ORDER BY created_at ASC LIMIT $limit START $offset"
            ))
            .bind(("tenant_id", tenant_id))
            .bind(("certificate_type", certificate_type))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CertificateRow> = result.take(0).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(CertificateRow::try_into_certificate)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}
