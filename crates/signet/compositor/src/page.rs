//! Page-level document surgery: locating page 1, resolving inherited
//! attributes, and registering overlay resources.

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::{RenderError, RenderResult};

/// Object id of page 1. Fails when the document has no pages.
pub(crate) fn first_page(doc: &Document) -> RenderResult<ObjectId> {
    doc.get_pages().get(&1).copied().ok_or_else(|| {
        RenderError::UnsupportedDocument("document has no first page".to_string())
    })
}

/// Height of the page in page units, from its `MediaBox`. Page attributes
/// may be inherited, so the `Parent` chain is consulted.
pub(crate) fn page_height(doc: &Document, page_id: ObjectId) -> RenderResult<f64> {
    let media_box = inherited_attr(doc, page_id, b"MediaBox")?.ok_or_else(|| {
        RenderError::UnsupportedDocument("page has no MediaBox".to_string())
    })?;
    let rect = rect_values(doc, &media_box)?;
    Ok(rect[3] - rect[1])
}

/// Ensure the page carries its own `Resources` dictionary, cloning an
/// inherited one if needed, so overlay names can be added without touching
/// sibling pages.
pub(crate) fn materialize_resources(doc: &mut Document, page_id: ObjectId) -> RenderResult<()> {
    if doc
        .get_dictionary(page_id)
        .map_err(malformed)?
        .has(b"Resources")
    {
        return Ok(());
    }
    let resources = match inherited_attr(doc, page_id, b"Resources")? {
        Some(Object::Reference(id)) => doc.get_dictionary(id).map_err(malformed)?.clone(),
        Some(Object::Dictionary(dict)) => dict,
        Some(_) => {
            return Err(RenderError::Pdf(
                "page Resources is not a dictionary".to_string(),
            ))
        }
        None => Dictionary::new(),
    };
    let mut page = doc.get_dictionary(page_id).map_err(malformed)?.clone();
    page.set("Resources", Object::Dictionary(resources));
    doc.objects.insert(page_id, Object::Dictionary(page));
    Ok(())
}

/// Register `object_id` under `category` in the page's resources with a
/// fresh `prefix`-numbered name, returning the name.
pub(crate) fn add_resource(
    doc: &mut Document,
    page_id: ObjectId,
    category: &[u8],
    object_id: ObjectId,
    prefix: &str,
) -> RenderResult<String> {
    let slot = doc
        .get_dictionary(page_id)
        .map_err(malformed)?
        .get(b"Resources")
        .map_err(|e| RenderError::Pdf(e.to_string()))?
        .clone();

    // Resources may live inline on the page or behind a reference, and the
    // category sub-dictionary may itself be a reference.
    match slot {
        Object::Reference(resources_id) => {
            let resources = doc.get_dictionary(resources_id).map_err(malformed)?.clone();
            let (resources, name) = upsert_category(doc, resources, category, object_id, prefix)?;
            doc.objects
                .insert(resources_id, Object::Dictionary(resources));
            Ok(name)
        }
        Object::Dictionary(resources) => {
            let (resources, name) = upsert_category(doc, resources, category, object_id, prefix)?;
            let mut page = doc.get_dictionary(page_id).map_err(malformed)?.clone();
            page.set("Resources", Object::Dictionary(resources));
            doc.objects.insert(page_id, Object::Dictionary(page));
            Ok(name)
        }
        _ => Err(RenderError::Pdf(
            "page Resources is not a dictionary".to_string(),
        )),
    }
}

fn upsert_category(
    doc: &mut Document,
    mut resources: Dictionary,
    category: &[u8],
    object_id: ObjectId,
    prefix: &str,
) -> RenderResult<(Dictionary, String)> {
    match resources.get(category).ok().cloned() {
        Some(Object::Reference(category_id)) => {
            let mut dict = doc.get_dictionary(category_id).map_err(malformed)?.clone();
            let name = alloc_name(&dict, prefix);
            dict.set(name.clone(), Object::Reference(object_id));
            doc.objects.insert(category_id, Object::Dictionary(dict));
            Ok((resources, name))
        }
        Some(Object::Dictionary(mut dict)) => {
            let name = alloc_name(&dict, prefix);
            dict.set(name.clone(), Object::Reference(object_id));
            resources.set(category, Object::Dictionary(dict));
            Ok((resources, name))
        }
        Some(_) => Err(RenderError::Pdf(
            "resource category is not a dictionary".to_string(),
        )),
        None => {
            let mut dict = Dictionary::new();
            let name = alloc_name(&dict, prefix);
            dict.set(name.clone(), Object::Reference(object_id));
            resources.set(category, Object::Dictionary(dict));
            Ok((resources, name))
        }
    }
}

/// First unused `prefix`-numbered name in the dictionary. Deterministic, so
/// identical renders allocate identical names.
fn alloc_name(dict: &Dictionary, prefix: &str) -> String {
    let mut index = 1u32;
    loop {
        let name = format!("{prefix}{index}");
        if !dict.has(name.as_bytes()) {
            return name;
        }
        index += 1;
    }
}

fn inherited_attr(
    doc: &Document,
    page_id: ObjectId,
    key: &[u8],
) -> RenderResult<Option<Object>> {
    let mut current = page_id;
    // Parent chains in real documents are shallow; the bound only guards
    // against cycles in a damaged file.
    for _ in 0..64 {
        let dict = doc.get_dictionary(current).map_err(malformed)?;
        if let Ok(value) = dict.get(key) {
            return Ok(Some(value.clone()));
        }
        match dict.get(b"Parent") {
            Ok(Object::Reference(parent)) => current = *parent,
            _ => return Ok(None),
        }
    }
    Ok(None)
}

fn rect_values(doc: &Document, obj: &Object) -> RenderResult<[f64; 4]> {
    let resolved = match obj {
        Object::Reference(id) => doc.get_object(*id).map_err(malformed)?,
        other => other,
    };
    let array = resolved.as_array().map_err(malformed)?;
    if array.len() != 4 {
        return Err(RenderError::UnsupportedDocument(
            "malformed MediaBox".to_string(),
        ));
    }
    let mut out = [0.0; 4];
    for (slot, value) in out.iter_mut().zip(array) {
        *slot = number(doc, value)?;
    }
    Ok(out)
}

fn number(doc: &Document, obj: &Object) -> RenderResult<f64> {
    let resolved = match obj {
        Object::Reference(id) => doc.get_object(*id).map_err(malformed)?,
        other => other,
    };
    match resolved {
        Object::Integer(value) => Ok(*value as f64),
        Object::Real(value) => Ok(*value as f64),
        _ => Err(RenderError::UnsupportedDocument(
            "malformed MediaBox".to_string(),
        )),
    }
}

fn malformed(e: lopdf::Error) -> RenderError {
    RenderError::UnsupportedDocument(e.to_string())
}
