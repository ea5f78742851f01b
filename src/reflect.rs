//! Extracts the collection, array and map shape of a method signature.

use crate::{
    error::ValidationError,
    types::{CollectionClass, Type},
};

/// The declared signature of a query method.
///
/// ```
/// use sqlx_query_mapper::reflect::{MethodInfo, MethodSignature};
/// use sqlx_query_mapper::types::Type;
///
/// let signature = MethodSignature::new("find_names", Type::list(Type::String))
///     .param(Type::array(Type::I64));
/// let info = MethodInfo::reflect(&signature)?;
///
/// assert_eq!(info.parameters[0].array_element, Some(Type::I64));
/// assert_eq!(info.return_info.element, Some(Type::String));
/// # Ok::<(), sqlx_query_mapper::error::ValidationError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct MethodSignature {
    pub name: String,
    pub parameters: Vec<Type>,
    pub return_type: Type,
}

impl MethodSignature {
    pub fn new(name: impl Into<String>, return_type: Type) -> Self {
        MethodSignature {
            name: name.into(),
            parameters: Vec::new(),
            return_type,
        }
    }

    pub fn param(mut self, ty: Type) -> Self {
        self.parameters.push(ty);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodParameterInfo {
    /// 1-based position in the signature.
    pub index: usize,
    pub ty: Type,
    pub collection: Option<CollectionClass>,
    pub element: Option<Type>,
    pub array_element: Option<Type>,
}

impl MethodParameterInfo {
    pub fn is_collection(&self) -> bool {
        self.collection.is_some()
    }

    pub fn is_array(&self) -> bool {
        self.array_element.is_some()
    }

    /// The type each bound value has: the element type for collections
    /// and arrays, the declared type otherwise.
    pub fn value_type(&self) -> &Type {
        self.element
            .as_ref()
            .or(self.array_element.as_ref())
            .unwrap_or(&self.ty)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodReturnInfo {
    pub ty: Type,
    pub collection: Option<CollectionClass>,
    /// Collection element, or map value.
    pub element: Option<Type>,
    pub map_key: Option<Type>,
}

impl MethodReturnInfo {
    pub fn is_map(&self) -> bool {
        self.map_key.is_some()
    }

    /// The type one row materializes into.
    pub fn value_type(&self) -> &Type {
        self.element.as_ref().unwrap_or(&self.ty)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodInfo {
    pub signature: MethodSignature,
    pub parameters: Vec<MethodParameterInfo>,
    pub return_info: MethodReturnInfo,
    /// 1-based indexes of collection parameters, which drive batches.
    pub collection_parameters: Vec<usize>,
}

impl MethodInfo {
    pub fn reflect(signature: &MethodSignature) -> Result<MethodInfo, ValidationError> {
        let malformed = |what: String| ValidationError::new(&signature.name, what);

        let mut parameters = Vec::with_capacity(signature.parameters.len());
        for (i, ty) in signature.parameters.iter().enumerate() {
            let index = i + 1;
            let unsupported =
                |_| malformed(format!("parameter {index} has unsupported element type {ty}"));
            let mut info = MethodParameterInfo {
                index,
                ty: ty.clone(),
                collection: None,
                element: None,
                array_element: None,
            };
            match ty {
                Type::Void => {
                    return Err(malformed(format!("parameter {index} cannot be ()")));
                }
                Type::Collection(class, element) => {
                    info.collection = Some(*class);
                    info.element = Some(element_of(element).map_err(unsupported)?);
                }
                Type::Array(element) if !ty.is_blob() => {
                    info.array_element = Some(element_of(element).map_err(unsupported)?);
                }
                _ => {}
            }
            parameters.push(info);
        }

        let ty = &signature.return_type;
        let return_info = match ty {
            Type::Collection(class, element) => MethodReturnInfo {
                ty: ty.clone(),
                collection: Some(*class),
                element: Some(element_of(element).map_err(|_| {
                    malformed(format!("unsupported return element type in {ty}"))
                })?),
                map_key: None,
            },
            Type::Map(key, value) => {
                if !key.is_atomic() {
                    return Err(malformed(format!("unsupported map key type in {ty}")));
                }
                MethodReturnInfo {
                    ty: ty.clone(),
                    collection: None,
                    element: Some(element_of(value).map_err(|_| {
                        malformed(format!("unsupported map value type in {ty}"))
                    })?),
                    map_key: Some((**key).clone()),
                }
            }
            _ => MethodReturnInfo {
                ty: ty.clone(),
                collection: None,
                element: None,
                map_key: None,
            },
        };

        let collection_parameters = parameters
            .iter()
            .filter(|p| p.is_collection())
            .map(|p| p.index)
            .collect();

        Ok(MethodInfo {
            signature: signature.clone(),
            parameters,
            return_info,
            collection_parameters,
        })
    }

    pub fn name(&self) -> &str {
        &self.signature.name
    }
}

/// Elements must be atomic values or beans.
fn element_of(element: &Type) -> Result<Type, ()> {
    match element {
        Type::Void | Type::Collection(..) | Type::Map(..) => Err(()),
        Type::Array(_) if !element.is_blob() => Err(()),
        _ => Ok(element.clone()),
    }
}
