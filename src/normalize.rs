//! Response shape normalization.
//! List endpoints answer with a bare array, `{ items: [...] }`, or a Spring page object
//! (`content`, `number`, `size`, `totalPages`, `totalElements`). These helpers fold all of
//! them into one shape and never fail. Each result also reports which input shape was
//! seen, so an empty result caused by an unexpected payload can be told apart from a
//! genuinely empty list.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    /// null or no body
    Absent,
    BareArray,
    /// object with an `items` array
    ItemsWrapper,
    /// object with a `content` array
    PageObject,
    Unrecognized,
}

impl Shape {
    pub fn is_recognized(&self) -> bool { !matches!(self, Shape::Unrecognized) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page_index: u64,
    pub page_size: u64,
    pub total_pages: u64,
    pub total_items: u64,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self { items: Vec::new(), page_index: 0, page_size: 0, total_pages: 0, total_items: 0 }
    }

    pub fn len(&self) -> usize { self.items.len() }

    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    pub fn has_next(&self) -> bool { self.page_index + 1 < self.total_pages }
}

impl<T> Default for Page<T> {
    fn default() -> Self { Self::empty() }
}

impl Page<Value> {
    /// Decode every record into `T`. The first record that does not fit fails the page.
    pub fn decode<T: DeserializeOwned>(self) -> Result<Page<T>, serde_json::Error> {
        let items = self.items.into_iter().map(serde_json::from_value).collect::<Result<Vec<T>, _>>()?;
        Ok(Page {
            items,
            page_index: self.page_index,
            page_size: self.page_size,
            total_pages: self.total_pages,
            total_items: self.total_items,
        })
    }
}

/// A normalized value plus the shape it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized<T> {
    pub value: T,
    pub shape: Shape,
}

impl<T> Normalized<T> {
    pub fn into_inner(self) -> T { self.value }
}

fn count(obj: &Map<String, Value>, key: &str) -> Option<u64> {
    obj.get(key).and_then(|v| v.as_u64())
}

fn array_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Vec<Value>> {
    obj.get(key).and_then(|v| v.as_array())
}

pub fn normalise_page(response: Option<&Value>) -> Normalized<Page<Value>> {
    match response {
        None | Some(Value::Null) => Normalized { value: Page::empty(), shape: Shape::Absent },
        Some(Value::Array(arr)) => {
            let n = arr.len() as u64;
            let page = Page {
                items: arr.clone(),
                page_index: 0,
                page_size: n,
                total_pages: if n > 0 { 1 } else { 0 },
                total_items: n,
            };
            Normalized { value: page, shape: Shape::BareArray }
        }
        Some(Value::Object(obj)) => {
            let (items, shape) = if let Some(c) = array_field(obj, "content") {
                (c.clone(), Shape::PageObject)
            } else if let Some(i) = array_field(obj, "items") {
                (i.clone(), Shape::ItemsWrapper)
            } else {
                (Vec::new(), Shape::Unrecognized)
            };
            let n = items.len() as u64;
            let page_size = count(obj, "size").unwrap_or(n);
            let page = Page {
                items,
                page_index: count(obj, "number").unwrap_or(0),
                page_size,
                total_pages: count(obj, "totalPages").unwrap_or(if page_size > 0 { 1 } else { 0 }),
                total_items: count(obj, "totalElements").unwrap_or(n),
            };
            Normalized { value: page, shape }
        }
        Some(_) => Normalized { value: Page::empty(), shape: Shape::Unrecognized },
    }
}

/// Flatten a list response into its records; `items` is preferred over `content`.
pub fn normalise_array(response: Option<&Value>) -> Normalized<Vec<Value>> {
    match response {
        None | Some(Value::Null) => Normalized { value: Vec::new(), shape: Shape::Absent },
        Some(Value::Array(arr)) => Normalized { value: arr.clone(), shape: Shape::BareArray },
        Some(Value::Object(obj)) => {
            if let Some(i) = array_field(obj, "items") {
                Normalized { value: i.clone(), shape: Shape::ItemsWrapper }
            } else if let Some(c) = array_field(obj, "content") {
                Normalized { value: c.clone(), shape: Shape::PageObject }
            } else {
                Normalized { value: Vec::new(), shape: Shape::Unrecognized }
            }
        }
        Some(_) => Normalized { value: Vec::new(), shape: Shape::Unrecognized },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_and_null_are_empty() {
        let a = normalise_page(None);
        let b = normalise_page(Some(&Value::Null));
        assert_eq!(a, b);
        assert_eq!(a.value, Page::empty());
        assert_eq!(a.shape, Shape::Absent);
    }

    #[test]
    fn bare_array() {
        let v = json!(["a", "b", "c"]);
        let p = normalise_page(Some(&v));
        assert_eq!(p.value, Page { items: vec![json!("a"), json!("b"), json!("c")], page_index: 0, page_size: 3, total_pages: 1, total_items: 3 });
        assert_eq!(p.shape, Shape::BareArray);

        let empty = normalise_page(Some(&json!([])));
        assert_eq!(empty.value.total_pages, 0);
        assert!(empty.shape.is_recognized());
    }

    #[test]
    fn spring_page_fields_verbatim() {
        let v = json!({"content": ["a"], "number": 2, "size": 10, "totalPages": 5, "totalElements": 41});
        let p = normalise_page(Some(&v)).value;
        assert_eq!(p, Page { items: vec![json!("a")], page_index: 2, page_size: 10, total_pages: 5, total_items: 41 });
        assert!(p.has_next());
    }

    #[test]
    fn items_wrapper_derives_counts() {
        let v = json!({"items": [1, 2]});
        let p = normalise_page(Some(&v));
        assert_eq!(p.shape, Shape::ItemsWrapper);
        assert_eq!(p.value, Page { items: vec![json!(1), json!(2)], page_index: 0, page_size: 2, total_pages: 1, total_items: 2 });
    }

    #[test]
    fn object_without_records_is_flagged() {
        let p = normalise_page(Some(&json!({"status": "ok"})));
        assert_eq!(p.value, Page::empty());
        assert_eq!(p.shape, Shape::Unrecognized);
        let s = normalise_page(Some(&json!("oops")));
        assert_eq!(s.value, Page::empty());
        assert!(!s.shape.is_recognized());
    }

    #[test]
    fn negative_counts_ignored() {
        let v = json!({"content": [1], "size": -1, "totalElements": -5});
        let p = normalise_page(Some(&v)).value;
        assert_eq!(p.page_size, 1);
        assert_eq!(p.total_items, 1);
    }

    #[test]
    fn array_normalization() {
        assert_eq!(normalise_array(Some(&json!({"items": ["x"]}))).value, vec![json!("x")]);
        assert_eq!(normalise_array(Some(&json!({"content": ["y"]}))).value, vec![json!("y")]);
        assert_eq!(normalise_array(Some(&json!([1]))).shape, Shape::BareArray);
        let oops = normalise_array(Some(&json!("oops")));
        assert!(oops.value.is_empty());
        assert_eq!(oops.shape, Shape::Unrecognized);
        assert_eq!(normalise_array(None).shape, Shape::Absent);
        // items wins when both are present
        assert_eq!(normalise_array(Some(&json!({"items": [1], "content": [2]}))).value, vec![json!(1)]);
    }

    #[test]
    fn typed_decode() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Row { id: u32 }
        let p = normalise_page(Some(&json!([{"id": 1}, {"id": 2}]))).value.decode::<Row>().unwrap();
        assert_eq!(p.items, vec![Row { id: 1 }, Row { id: 2 }]);
        assert!(normalise_page(Some(&json!([{"id": "x"}]))).value.decode::<Row>().is_err());
    }
}
