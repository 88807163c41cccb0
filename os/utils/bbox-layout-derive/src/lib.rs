//! # Persist Derive
//!
//! Generates `bbox_layout::Persist` for structs with named fields. Fields are
//! laid out back to back in declaration order with no implicit padding; add
//! explicit `reserved` fields where alignment matters.

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{Data, DeriveInput, Fields, LitBool, parse_macro_input, spanned::Spanned};

/// Derive `bbox_layout::Persist`.
///
/// - Every field type must itself implement `Persist`.
/// - `#[persist(skip)]` excludes a field from the encoding; it is restored
///   with `Default::default()` on decode.
/// - For each encoded field `foo` an associated constant `FOO_OFFSET` holds its
///   byte offset inside the encoding.
///
/// # Example
///
/// ```ignore
/// use bbox_layout::Persist;
///
/// #[derive(Persist, Default)]
/// struct Header {
///     magic: u32,
///     name: [u8; 8],
///     #[persist(skip)]
///     cached: bool,
/// }
///
/// assert_eq!(<Header as Persist>::SIZE, 12);
/// assert_eq!(Header::NAME_OFFSET, 4);
/// ```
#[proc_macro_derive(Persist, attributes(persist))]
pub fn derive_persist(input: TokenStream) -> TokenStream {
    let DeriveInput {
        ident,
        generics,
        data,
        ..
    } = parse_macro_input!(input as DeriveInput);

    let fields = match data {
        Data::Struct(s) => match s.fields {
            Fields::Named(n) => n.named,
            Fields::Unnamed(u) => {
                return syn::Error::new(u.span(), "Persist only supports named fields")
                    .to_compile_error()
                    .into();
            }
            Fields::Unit => {
                return syn::Error::new(ident.span(), "Persist does not apply to unit structs")
                    .to_compile_error()
                    .into();
            }
        },
        _ => {
            return syn::Error::new(ident.span(), "Persist can only be derived for structs")
                .to_compile_error()
                .into();
        }
    };

    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let mut offsets = Vec::new();
    let mut writes = Vec::new();
    let mut reads = Vec::new();
    let mut inits = Vec::new();
    let mut sizes = Vec::new();

    for field in fields {
        let Some(fname) = field.ident.clone() else { continue };
        if should_skip(&field.attrs) {
            inits.push(quote! { #fname: ::core::default::Default::default() });
            continue;
        }

        let ty = &field.ty;
        let size = quote! { <#ty as ::bbox_layout::Persist>::SIZE };
        let offset_name = format_ident!("{}_OFFSET", fname.to_string().to_uppercase());
        let prior = sizes.clone();

        offsets.push(quote! {
            #[allow(dead_code)]
            pub const #offset_name: usize = 0 #(+ #prior)*;
        });
        writes.push(quote! {
            ::bbox_layout::Persist::write_le(&self.#fname, &mut out[off..off + #size]);
            off += #size;
        });
        reads.push(quote! {
            let #fname = <#ty as ::bbox_layout::Persist>::read_le(&buf[off..off + #size]);
            off += #size;
        });
        inits.push(quote! { #fname });
        sizes.push(size);
    }

    let expanded = quote! {
        impl #impl_generics #ident #ty_generics #where_clause {
            #(#offsets)*
        }

        impl #impl_generics ::bbox_layout::Persist for #ident #ty_generics #where_clause {
            const SIZE: usize = 0 #(+ #sizes)*;

            #[allow(unused_assignments, unused_mut, unused_variables)]
            fn write_le(&self, out: &mut [u8]) {
                let mut off = 0usize;
                #(#writes)*
            }

            #[allow(unused_assignments, unused_mut, unused_variables)]
            fn read_le(buf: &[u8]) -> Self {
                let mut off = 0usize;
                #(#reads)*
                Self { #(#inits),* }
            }
        }
    };

    TokenStream::from(expanded)
}

fn should_skip(attrs: &[syn::Attribute]) -> bool {
    let mut skip = false;
    for attr in attrs {
        if !attr.path().is_ident("persist") {
            continue;
        }

        // Accept #[persist(skip)] and #[persist(skip = true)]
        let _ = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                if meta.input.is_empty() {
                    skip = true;
                } else if let Ok(v) = meta.value()?.parse::<LitBool>()
                    && v.value
                {
                    skip = true;
                }
            }
            Ok(())
        });
    }
    skip
}
