//! Derive macro for the `Data` trait of `promap-common`.
extern crate proc_macro;

use proc_macro2::Span;
use quote::{ToTokens, TokenStreamExt};

mod data;

//--------------------------------------------------------------------------------------------------
struct CrateName;
const CRATE: CrateName = CrateName;

impl ToTokens for CrateName {
    fn to_tokens(&self, tokens: &mut proc_macro2::TokenStream) {
        tokens.append(syn::Ident::new("promap_common", Span::call_site()))
    }
}

//--------------------------------------------------------------------------------------------------
#[proc_macro_derive(Data, attributes(data))]
pub fn derive_data(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = syn::parse_macro_input!(input as syn::DeriveInput);
    data::derive_data_impl(input)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}
