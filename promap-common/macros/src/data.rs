// Copyright 2019 The Druid Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// Adapted for use in promap.
use crate::CRATE;
use proc_macro2::{Ident, Span, TokenStream};
use quote::{format_ident, quote, quote_spanned};
use syn::{spanned::Spanned, DataEnum, DataStruct, Error, ExprPath, LitStr};

const DATA_ATTR_PATH: &str = "data";
const IGNORE_ATTR_PATH: &str = "ignore";
const SAME_FN_ATTR_PATH: &str = "same_fn";
const CRATE_ATTR_PATH: &str = "crate";

/// Options given on the type itself.
struct Container {
    /// Path of the crate that defines the `Data` trait.
    krate: syn::Path,
}

impl Container {
    fn parse_ast(input: &syn::DeriveInput) -> Result<Container, Error> {
        let mut krate = None;

        for attr in input.attrs.iter().filter(|attr| attr.path().is_ident(DATA_ATTR_PATH)) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident(CRATE_ATTR_PATH) {
                    if krate.is_some() {
                        return Err(meta.error("duplicate attribute"));
                    }
                    let lit: LitStr = meta.value()?.parse()?;
                    krate = Some(lit.parse::<syn::Path>()?);
                    Ok(())
                } else {
                    Err(meta.error("unknown attribute (expected `crate = \"...\"`)"))
                }
            })?;
        }

        Ok(Container {
            krate: krate.unwrap_or_else(|| syn::parse_quote!(::#CRATE)),
        })
    }
}

/// A parsed struct field or enum variant field.
struct Field {
    /// Accessor: identifier for named fields, index for tuple fields.
    member: syn::Member,
    /// Name of the binding used in `match` arms.
    binding: String,
    ignore: bool,
    same_fn: Option<ExprPath>,
}

impl Field {
    fn parse_ast(field: &syn::Field, index: usize) -> Result<Field, Error> {
        let (member, binding) = match field.ident.as_ref() {
            Some(ident) => (
                syn::Member::Named(ident.clone()),
                ident.to_string().trim_start_matches("r#").to_owned(),
            ),
            None => (syn::Member::Unnamed(syn::Index::from(index)), index.to_string()),
        };

        let mut ignore = false;
        let mut same_fn = None;

        for attr in field.attrs.iter().filter(|attr| attr.path().is_ident(DATA_ATTR_PATH)) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident(IGNORE_ATTR_PATH) {
                    if ignore {
                        return Err(meta.error("duplicate attribute"));
                    }
                    ignore = true;
                    Ok(())
                } else if meta.path.is_ident(SAME_FN_ATTR_PATH) {
                    if same_fn.is_some() {
                        return Err(meta.error("duplicate attribute"));
                    }
                    let lit: LitStr = meta.value()?.parse()?;
                    same_fn = Some(lit.parse::<ExprPath>()?);
                    Ok(())
                } else {
                    Err(meta.error("unknown attribute (expected `ignore` or `same_fn = \"...\"`)"))
                }
            })?;
        }

        Ok(Field {
            member,
            binding,
            ignore,
            same_fn,
        })
    }

    /// The tokens to be used as the function for 'same'.
    fn same_fn_tokens(&self, krate: &syn::Path) -> TokenStream {
        match self.same_fn {
            Some(ref f) => quote!(#f),
            None => {
                let span = Span::call_site();
                quote_spanned!(span=> #krate::Data::same)
            }
        }
    }

    fn left(&self) -> Ident {
        format_ident!("__self_{}", self.binding)
    }

    fn right(&self) -> Ident {
        format_ident!("__other_{}", self.binding)
    }
}

fn parse_fields(fields: &syn::Fields) -> Result<Vec<Field>, Error> {
    fields
        .iter()
        .enumerate()
        .map(|(i, field)| Field::parse_ast(field, i))
        .collect()
}

/// Joins comparisons with `&&`, or `true` if there is nothing to compare.
fn conjunction(tests: Vec<TokenStream>) -> TokenStream {
    if tests.is_empty() {
        quote!(true)
    } else {
        quote!( #( #tests )&&* )
    }
}

pub(crate) fn derive_data_impl(input: syn::DeriveInput) -> Result<TokenStream, Error> {
    let container = Container::parse_ast(&input)?;
    match &input.data {
        syn::Data::Struct(s) => derive_struct(&input, &container.krate, s),
        syn::Data::Enum(e) => derive_enum(&input, &container.krate, e),
        syn::Data::Union(u) => Err(Error::new(
            u.union_token.span(),
            "Data implementations cannot be derived from unions",
        )),
    }
}

fn derive_struct(input: &syn::DeriveInput, krate: &syn::Path, s: &DataStruct) -> Result<TokenStream, Error> {
    let ident = &input.ident;
    let impl_generics = generics_bounds(&input.generics, krate);
    let (_, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = parse_fields(&s.fields)?;
    let tests = fields
        .iter()
        .filter(|f| !f.ignore)
        .map(|f| {
            let same_fn = f.same_fn_tokens(krate);
            let member = &f.member;
            quote!( #same_fn(&self.#member, &other.#member) )
        })
        .collect();
    let body = conjunction(tests);

    Ok(quote! {
        impl<#impl_generics> #krate::Data for #ident #ty_generics #where_clause {
            fn same(&self, other: &Self) -> bool {
                #body
            }
        }
    })
}

fn is_c_style_enum(e: &DataEnum) -> bool {
    e.variants.iter().all(|variant| variant.fields.is_empty())
}

fn derive_enum(input: &syn::DeriveInput, krate: &syn::Path, e: &DataEnum) -> Result<TokenStream, Error> {
    let ident = &input.ident;
    let impl_generics = generics_bounds(&input.generics, krate);
    let (_, ty_generics, where_clause) = input.generics.split_for_impl();

    if is_c_style_enum(e) {
        return Ok(quote! {
            impl<#impl_generics> #krate::Data for #ident #ty_generics #where_clause {
                fn same(&self, other: &Self) -> bool { self == other }
            }
        });
    }

    let mut cases = Vec::new();
    for variant in e.variants.iter() {
        let fields = parse_fields(&variant.fields)?;
        let name = &variant.ident;

        let tests = fields
            .iter()
            .filter(|f| !f.ignore)
            .map(|f| {
                let same_fn = f.same_fn_tokens(krate);
                let (l, r) = (f.left(), f.right());
                quote!( #same_fn(#l, #r) )
            })
            .collect();
        let body = conjunction(tests);

        let case = match &variant.fields {
            syn::Fields::Named(_) => {
                let lefts = fields.iter().map(|f| {
                    let (member, l) = (&f.member, f.left());
                    quote!( #member: #l )
                });
                let rights = fields.iter().map(|f| {
                    let (member, r) = (&f.member, f.right());
                    quote!( #member: #r )
                });
                quote! {
                    (#ident::#name { #( #lefts ),* }, #ident::#name { #( #rights ),* }) => { #body }
                }
            }
            syn::Fields::Unnamed(_) => {
                let lefts = fields.iter().map(Field::left);
                let rights = fields.iter().map(Field::right);
                quote! {
                    (#ident::#name( #( #lefts ),* ), #ident::#name( #( #rights ),* )) => { #body }
                }
            }
            syn::Fields::Unit => quote! {
                (#ident::#name, #ident::#name) => { true }
            },
        };
        cases.push(case);
    }

    Ok(quote! {
        impl<#impl_generics> #krate::Data for #ident #ty_generics #where_clause {
            #[allow(unused_variables)]
            fn same(&self, other: &Self) -> bool {
                match (self, other) {
                    #( #cases, )*
                    _ => false,
                }
            }
        }
    })
}

fn generics_bounds(generics: &syn::Generics, krate: &syn::Path) -> TokenStream {
    let res = generics.params.iter().map(|gp| {
        use syn::GenericParam::*;
        match gp {
            Type(ty) => {
                let ident = &ty.ident;
                let bounds = &ty.bounds;
                if bounds.is_empty() {
                    quote_spanned!(ty.span()=> #ident : #krate::Data)
                } else {
                    quote_spanned!(ty.span()=> #ident : #bounds + #krate::Data)
                }
            }
            Lifetime(lf) => quote!(#lf),
            Const(cst) => quote!(#cst),
        }
    });

    quote!( #( #res, )* )
}
