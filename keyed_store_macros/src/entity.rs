use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::ext::IdentExt;
use syn::{Data, DeriveInput, Fields, FieldsNamed, Ident, LitStr, Type};

pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);

    match expand(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => TokenStream::from(err.to_compile_error()),
    }
}

struct StructOptions {
    collection: String,
    validate: Option<Ident>,
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = named_fields(input)?;
    let options = struct_options(input)?;
    let id_field = extract_id_field(input, fields)?;
    if let Some(field) = fields
        .named
        .iter()
        .find(|field| field.ident.as_ref() == Some(&id_field))
    {
        check_id_type(&field.ty)?;
    }

    let collection = &options.collection;
    let validate_fn = options.validate.as_ref().map(|method| {
        quote! {
            fn validate(&self) -> ::core::result::Result<(), ::keyed_store::InvalidValue> {
                self.#method()
            }
        }
    });

    let with_methods = fields
        .named
        .iter()
        .filter(|field| field.ident.as_ref() != Some(&id_field))
        .filter_map(|field| {
            let ident = field.ident.as_ref()?;
            let ty = &field.ty;
            let method = format_ident!("with_{}", ident.unraw());
            let doc = format!(" Returns a copy with `{}` replaced.", ident.unraw());
            Some(quote! {
                #[doc = #doc]
                #[must_use]
                pub fn #method(&self, #ident: #ty) -> Self {
                    Self {
                        #ident,
                        ..::core::clone::Clone::clone(self)
                    }
                }
            })
        });

    Ok(quote! {
        impl #impl_generics ::keyed_store::Entity for #name #ty_generics #where_clause {
            const COLLECTION: &'static str = #collection;

            fn id(&self) -> ::keyed_store::EntityId {
                ::core::convert::Into::into(self.#id_field)
            }

            #validate_fn
        }

        impl #impl_generics #name #ty_generics #where_clause {
            #(#with_methods)*
        }
    })
}

fn named_fields(input: &DeriveInput) -> syn::Result<&FieldsNamed> {
    if let Data::Struct(data_struct) = &input.data {
        if let Fields::Named(fields) = &data_struct.fields {
            return Ok(fields);
        }
    }

    Err(syn::Error::new_spanned(
        &input.ident,
        "Entity derive: only structs with named fields are supported",
    ))
}

fn struct_options(input: &DeriveInput) -> syn::Result<StructOptions> {
    let mut collection = None;
    let mut validate = None;

    for attr in &input.attrs {
        if !attr.path().is_ident("entity") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("collection") {
                let value: LitStr = meta.value()?.parse()?;
                collection = Some(value.value());
                Ok(())
            } else if meta.path.is_ident("validate") {
                let value: LitStr = meta.value()?.parse()?;
                validate = Some(value.parse::<Ident>()?);
                Ok(())
            } else {
                Err(meta.error("unknown entity attribute"))
            }
        })?;
    }

    // Default: snake_case struct name + "s"
    let collection =
        collection.unwrap_or_else(|| format!("{}s", to_snake_case(&input.ident.to_string())));

    Ok(StructOptions {
        collection,
        validate,
    })
}

fn extract_id_field(input: &DeriveInput, fields: &FieldsNamed) -> syn::Result<Ident> {
    for field in &fields.named {
        for attr in &field.attrs {
            if !attr.path().is_ident("entity") {
                continue;
            }

            let mut is_id = false;
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("id") {
                    is_id = true;
                    Ok(())
                } else {
                    Err(meta.error("unknown entity field attribute"))
                }
            })?;

            if is_id {
                if let Some(ident) = &field.ident {
                    return Ok(ident.clone());
                }
            }
        }
    }

    // Default: look for a field named "id"
    for field in &fields.named {
        if let Some(ident) = &field.ident {
            if ident == "id" {
                return Ok(ident.clone());
            }
        }
    }

    Err(syn::Error::new_spanned(
        &input.ident,
        "Entity derive: no field marked with #[entity(id)] and no field named `id`",
    ))
}

// Ids convert into EntityId (u64) through `Into`, which only exists for
// unsigned integers no wider than u64.
const ID_TYPES: [&str; 5] = ["u8", "u16", "u32", "u64", "EntityId"];

fn check_id_type(ty: &Type) -> syn::Result<()> {
    if let Type::Path(type_path) = ty {
        if type_path.qself.is_none() {
            if let Some(segment) = type_path.path.segments.last() {
                if segment.arguments.is_empty()
                    && ID_TYPES.iter().any(|name| segment.ident == *name)
                {
                    return Ok(());
                }
            }
        }
    }

    Err(syn::Error::new_spanned(
        ty,
        "Entity derive: the id field must be u8, u16, u32, u64 or EntityId; \
         signed ids do not convert losslessly into EntityId",
    ))
}

fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    for (i, ch) in s.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.extend(ch.to_lowercase());
        } else {
            result.push(ch);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn unsigned_id_types_are_accepted() {
        assert!(check_id_type(&parse_quote!(u32)).is_ok());
        assert!(check_id_type(&parse_quote!(u64)).is_ok());
        assert!(check_id_type(&parse_quote!(keyed_store::EntityId)).is_ok());
    }

    #[test]
    fn signed_and_other_id_types_are_rejected() {
        let types: [Type; 4] = [
            parse_quote!(i32),
            parse_quote!(i64),
            parse_quote!(String),
            parse_quote!(Option<u64>),
        ];
        for ty in types {
            let err = check_id_type(&ty).unwrap_err();
            assert!(err.to_string().contains("u8, u16, u32, u64 or EntityId"));
        }
    }

    #[test]
    fn derive_reports_signed_id() {
        let input: DeriveInput = parse_quote! {
            struct Patient {
                id: i64,
                name: String,
            }
        };
        let err = expand(&input).unwrap_err();
        assert!(err.to_string().contains("signed ids"));
    }

    #[test]
    fn collection_defaults_to_snake_case_plural() {
        let input: DeriveInput = parse_quote! {
            struct GroceryItem {
                id: u64,
            }
        };
        assert_eq!(struct_options(&input).unwrap().collection, "grocery_items");
    }
}
