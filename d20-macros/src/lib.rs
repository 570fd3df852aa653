//! Proc macros for d20 chain links.
//!
//! Provides `#[derive(LinkKind)]` to generate the serialization metadata of a
//! link-kind enum: its registry tags, the declared property list of every
//! variant, a by-name property accessor and a descriptive catalog.
//!
//! # Example
//!
//! ```ignore
//! #[derive(LinkKind)]
//! pub enum LinkKind {
//!     /// Always yields a fixed value.
//!     Static { value: Value },
//!     /// Adds another value to the running total.
//!     #[link(tag = "adder")]
//!     Adder {
//!         addend: Addend,
//!         #[link(skip)]
//!         scratch: Value,
//!     },
//!     /// Passes the input through unchanged.
//!     Identity,
//! }
//! ```
//!
//! The generated code refers to `crate::link::PropertyValue` and
//! `crate::link::KindDescriptor`, so the derive is meant to be used inside
//! `d20-core`.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, DeriveInput, Field, Lit, Meta, Variant};

/// Derive macro for link-kind enums.
///
/// # Attributes
///
/// - `#[link(tag = "...")]` on variants - Override the registry tag (defaults to lowerCamelCase variant name)
/// - `#[link(rename = "...")]` on fields - Override the serialized property name
/// - `#[link(skip)]` on fields - Keep the field out of the declared properties
#[proc_macro_derive(LinkKind, attributes(link))]
pub fn derive_link_kind(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_link_kind(input)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

struct VariantInfo {
    tag: String,
    description: String,
    pattern: TokenStream2,
    properties: Vec<String>,
    property_arms: Vec<TokenStream2>,
}

fn expand_link_kind(input: DeriveInput) -> syn::Result<TokenStream2> {
    let enum_name = &input.ident;

    let variants = match &input.data {
        syn::Data::Enum(data) => &data.variants,
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "LinkKind derive only supports enums",
            ))
        }
    };

    let mut infos = Vec::new();
    for variant in variants {
        infos.push(parse_variant(variant)?);
    }

    let mut seen = std::collections::HashSet::new();
    for (info, variant) in infos.iter().zip(variants) {
        if !seen.insert(info.tag.clone()) {
            return Err(syn::Error::new_spanned(
                variant,
                format!("duplicate link tag \"{}\"", info.tag),
            ));
        }
    }

    let tag_arms = infos.iter().map(|info| {
        let pattern = &info.pattern;
        let tag = &info.tag;
        quote! { #pattern => #tag, }
    });

    let property_list_arms = infos.iter().map(|info| {
        let pattern = &info.pattern;
        let properties = &info.properties;
        quote! { #pattern => &[#(#properties),*], }
    });

    let property_value_arms = infos.iter().map(|info| {
        let arms = &info.property_arms;
        arms.iter().cloned().collect::<TokenStream2>()
    });

    let catalog_entries = infos.iter().map(|info| {
        let tag = &info.tag;
        let properties = &info.properties;
        let description = &info.description;
        quote! {
            crate::link::KindDescriptor {
                tag: #tag,
                properties: &[#(#properties),*],
                description: #description,
            }
        }
    });

    Ok(quote! {
        impl #enum_name {
            /// Registry tag this kind serializes under.
            pub fn type_tag(&self) -> &'static str {
                match self {
                    #(#tag_arms)*
                }
            }

            /// Property names this kind writes into its serialized record.
            pub fn declared_properties(&self) -> &'static [&'static str] {
                match self {
                    #(#property_list_arms)*
                }
            }

            /// Look up a declared property by its serialized name.
            pub fn property(&self, key: &str) -> Option<crate::link::PropertyValue> {
                match self {
                    #(#property_value_arms)*
                    _ => None,
                }
            }

            /// Every kind this enum knows about, in declaration order.
            pub fn catalog() -> &'static [crate::link::KindDescriptor] {
                const CATALOG: &[crate::link::KindDescriptor] = &[#(#catalog_entries),*];
                CATALOG
            }
        }
    })
}

fn parse_variant(variant: &Variant) -> syn::Result<VariantInfo> {
    let ident = &variant.ident;
    let tag = get_variant_tag(variant)?;
    let description = get_doc_comment(&variant.attrs);

    match &variant.fields {
        syn::Fields::Unit => Ok(VariantInfo {
            tag,
            description,
            pattern: quote! { Self::#ident },
            properties: Vec::new(),
            property_arms: Vec::new(),
        }),
        syn::Fields::Named(named) => {
            let mut properties = Vec::new();
            let mut property_arms = Vec::new();

            for field in &named.named {
                if is_field_skipped(field)? {
                    continue;
                }
                let field_ident = field
                    .ident
                    .as_ref()
                    .ok_or_else(|| syn::Error::new_spanned(field, "expected a named field"))?;
                let property_name = get_field_name(field)?;

                property_arms.push(quote! {
                    Self::#ident { #field_ident, .. } if key == #property_name => {
                        Some(crate::link::PropertyValue::from(#field_ident))
                    }
                });
                properties.push(property_name);
            }

            Ok(VariantInfo {
                tag,
                description,
                pattern: quote! { Self::#ident { .. } },
                properties,
                property_arms,
            })
        }
        syn::Fields::Unnamed(_) => Err(syn::Error::new_spanned(
            variant,
            "LinkKind variants must be unit variants or have named fields",
        )),
    }
}

fn get_variant_tag(variant: &Variant) -> syn::Result<String> {
    for attr in &variant.attrs {
        if attr.path().is_ident("link") {
            let meta = attr.parse_args::<Meta>()?;
            if let Meta::NameValue(nv) = meta {
                if nv.path.is_ident("tag") {
                    if let syn::Expr::Lit(expr_lit) = &nv.value {
                        if let Lit::Str(s) = &expr_lit.lit {
                            return Ok(s.value());
                        }
                    }
                }
            }
        }
    }

    // Default: convert variant name to lowerCamelCase
    Ok(to_lower_camel_case(&variant.ident.to_string()))
}

fn get_field_name(field: &Field) -> syn::Result<String> {
    for attr in &field.attrs {
        if attr.path().is_ident("link") {
            if let Ok(Meta::NameValue(nv)) = attr.parse_args::<Meta>() {
                if nv.path.is_ident("rename") {
                    if let syn::Expr::Lit(expr_lit) = &nv.value {
                        if let Lit::Str(s) = &expr_lit.lit {
                            return Ok(s.value());
                        }
                    }
                }
            }
        }
    }

    field
        .ident
        .as_ref()
        .map(|ident| ident.to_string())
        .ok_or_else(|| syn::Error::new_spanned(field, "expected a named field"))
}

fn is_field_skipped(field: &Field) -> syn::Result<bool> {
    for attr in &field.attrs {
        if attr.path().is_ident("link") {
            if let Ok(Meta::Path(path)) = attr.parse_args::<Meta>() {
                if path.is_ident("skip") {
                    return Ok(true);
                }
            }
        }
    }
    Ok(false)
}

fn get_doc_comment(attrs: &[syn::Attribute]) -> String {
    let mut docs = Vec::new();
    for attr in attrs {
        if attr.path().is_ident("doc") {
            if let Meta::NameValue(nv) = &attr.meta {
                if let syn::Expr::Lit(expr_lit) = &nv.value {
                    if let Lit::Str(s) = &expr_lit.lit {
                        docs.push(s.value().trim().to_string());
                    }
                }
            }
        }
    }
    docs.join(" ")
}

fn to_lower_camel_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
