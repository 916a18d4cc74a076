//! Typed CRUD access to the platform's resources.
//! Proposals turn into work orders, which turn into invoices. Each is a plain
//! list/get/create/update endpoint; proposals and invoices also serve a PDF rendition.

use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::files::{save_response, FileSaver, SavedFile};
use crate::gateway::{ApiRequest, Gateway};
use crate::normalize::{normalise_array, normalise_page, Normalized, Page};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Proposals,
    WorkOrders,
    Invoices,
    Customers,
    Users,
}

impl Resource {
    pub const ALL: [Resource; 5] = [Resource::Proposals, Resource::WorkOrders, Resource::Invoices, Resource::Customers, Resource::Users];

    pub fn path(&self) -> &'static str {
        match self {
            Resource::Proposals => "proposals",
            Resource::WorkOrders => "work-orders",
            Resource::Invoices => "invoices",
            Resource::Customers => "customers",
            Resource::Users => "users",
        }
    }

    /// Singular label used for default download names.
    pub fn singular(&self) -> &'static str {
        match self {
            Resource::Proposals => "proposal",
            Resource::WorkOrders => "work-order",
            Resource::Invoices => "invoice",
            Resource::Customers => "customer",
            Resource::Users => "user",
        }
    }

    pub fn has_documents(&self) -> bool { matches!(self, Resource::Proposals | Resource::Invoices) }

    /// Fields that must be present and non-blank when creating a record.
    pub fn required_on_create(&self) -> &'static [&'static str] {
        match self {
            Resource::Proposals => &["customerId", "title"],
            Resource::WorkOrders => &["proposalId"],
            Resource::Invoices => &["workOrderId"],
            Resource::Customers => &["name"],
            Resource::Users => &["email", "role"],
        }
    }
}

impl Display for Resource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str(self.path()) }
}

impl FromStr for Resource {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace('_', "-");
        Resource::ALL
            .iter()
            .copied()
            .find(|r| r.path() == key || r.singular() == key || r.path().replace('-', "") == key)
            .ok_or_else(|| format!("unknown resource: {}", s))
    }
}

fn check_id(id: &str) -> ApiResult<String> {
    let id = id.trim();
    if id.is_empty() {
        return Err(ApiError::validation("id", "id is required"));
    }
    Ok(urlencoding::encode(id).into_owned())
}

fn check_body(resource: Resource, body: &Value, creating: bool) -> ApiResult<()> {
    let Some(obj) = body.as_object() else {
        return Err(ApiError::validation("body", "request body must be a JSON object"));
    };
    if creating {
        for field in resource.required_on_create() {
            let blank = match obj.get(*field) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.trim().is_empty(),
                _ => false,
            };
            if blank {
                return Err(ApiError::validation(field.to_string(), format!("{} is required", field)));
            }
        }
    } else if obj.is_empty() {
        return Err(ApiError::validation("body", "nothing to update"));
    }
    Ok(())
}

#[derive(Clone)]
pub struct ResourceClient {
    gateway: Arc<Gateway>,
    resource: Resource,
}

impl ResourceClient {
    pub fn new(gateway: Arc<Gateway>, resource: Resource) -> Self { Self { gateway, resource } }

    pub fn resource(&self) -> Resource { self.resource }

    pub async fn list(&self, page: Option<u64>, size: Option<u64>) -> ApiResult<Normalized<Page<Value>>> {
        Ok(self.fetch_page(page, size).await?.1)
    }

    async fn fetch_page(&self, page: Option<u64>, size: Option<u64>) -> ApiResult<(u16, Normalized<Page<Value>>)> {
        let mut req = ApiRequest::get(self.resource.path());
        if let Some(p) = page { req = req.query("page", p); }
        if let Some(s) = size { req = req.query("size", s); }
        let resp = self.gateway.send(req).await?;
        let status = resp.status;
        let v = resp.into_json()?;
        let page = normalise_page(Some(&v));
        if !page.shape.is_recognized() {
            debug!(target: "gateway", resource = %self.resource, "list response had an unrecognized shape");
        }
        Ok((status, page))
    }

    /// `list` with every record decoded into `T`. One bad record fails the whole page.
    pub async fn list_as<T: DeserializeOwned>(&self, page: Option<u64>, size: Option<u64>) -> ApiResult<Page<T>> {
        let (status, p) = self.fetch_page(page, size).await?;
        p.value
            .decode()
            .map_err(|e| ApiError::invalid_response(status, format!("{} record did not decode: {}", self.resource.singular(), e)))
    }

    pub async fn list_all(&self) -> ApiResult<Normalized<Vec<Value>>> {
        let v = self.gateway.send(ApiRequest::get(self.resource.path())).await?.into_json()?;
        Ok(normalise_array(Some(&v)))
    }

    pub async fn get(&self, id: &str) -> ApiResult<Value> {
        let id = check_id(id)?;
        self.gateway.get_json(&format!("{}/{}", self.resource.path(), id)).await
    }

    pub async fn create(&self, body: Value) -> ApiResult<Value> {
        check_body(self.resource, &body, true)?;
        self.gateway.post_json(self.resource.path(), body).await
    }

    pub async fn update(&self, id: &str, body: Value) -> ApiResult<Value> {
        let id = check_id(id)?;
        check_body(self.resource, &body, false)?;
        let req = ApiRequest::put(format!("{}/{}", self.resource.path(), id)).json(body);
        self.gateway.send(req).await?.into_json()
    }

    /// Fetch the PDF rendition and save it. The server's `Content-Disposition` name wins
    /// over `<resource>-<id>.pdf`.
    pub async fn download_document(&self, id: &str, saver: &dyn FileSaver) -> ApiResult<SavedFile> {
        if !self.resource.has_documents() {
            return Err(ApiError::validation("resource".to_string(), format!("{} have no documents", self.resource)));
        }
        let encoded = check_id(id)?;
        let resp = self.gateway.send(ApiRequest::get(format!("{}/{}/pdf", self.resource.path(), encoded))).await?;
        let fallback = format!("{}-{}", self.resource.singular(), id.trim());
        save_response(resp, &fallback, saver)
    }
}
