//! Derive macro for the `Adopt` trait.
//!
//! `#[derive(Adopt)]` on a type without a `WeakThis` field produces an empty
//! implementation. On a struct with exactly one `WeakThis<Self>` field (or a
//! field marked `#[shptr(weak_this)]`) it also wires the self reference and
//! implements `EnableSharedFromThis`.
//!
//! Use `#[shptr(crate = path)]` when the `shptr` crate is re-exported under a
//! different name.

use proc_macro2::TokenStream;
use quote::{quote, quote_spanned};
use syn::{
    parse_macro_input, parse_quote, spanned::Spanned, Attribute, Data, DeriveInput, Field,
    Fields, Index, Member, Path, Type,
};

/// Derive `shptr::Adopt`, and `shptr::EnableSharedFromThis` when the struct
/// carries a self reference.
#[proc_macro_derive(Adopt, attributes(shptr))]
pub fn derive_adopt(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.into_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream> {
    let shptr = crate_path(&input.attrs)?;
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let weak_this = match &input.data {
        Data::Struct(data) => find_weak_this(&data.fields)?,
        Data::Enum(data) => {
            for field in data.variants.iter().flat_map(|variant| &variant.fields) {
                if has_weak_this_attr(field)? {
                    return Err(syn::Error::new_spanned(
                        field,
                        "`#[shptr(weak_this)]` is only supported on struct fields",
                    ));
                }
            }
            None
        }
        Data::Union(u) => {
            return Ok(quote_spanned! {
                u.union_token.span => compile_error!("`Adopt` must be manually implemented for unions");
            });
        }
    };

    let Some(member) = weak_this else {
        return Ok(quote! {
            impl #impl_generics #shptr::Adopt for #name #ty_generics #where_clause {}
        });
    };

    Ok(quote! {
        impl #impl_generics #shptr::Adopt for #name #ty_generics #where_clause {
            const SELF_REFERENTIAL: bool = true;

            #[inline]
            fn adopt(&self, this: &#shptr::Weak<Self>) {
                #shptr::WeakThis::install(&self.#member, this);
            }
        }

        impl #impl_generics #shptr::EnableSharedFromThis for #name #ty_generics #where_clause {
            #[inline]
            fn weak_this(&self) -> &#shptr::WeakThis<Self> {
                &self.#member
            }
        }
    })
}

fn crate_path(attrs: &[Attribute]) -> syn::Result<Path> {
    let mut shptr: Path = parse_quote!(::shptr);

    for attr in attrs {
        if !attr.path().is_ident("shptr") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("crate") {
                shptr = meta.value()?.parse()?;
                Ok(())
            } else {
                Err(meta.error("unsupported attribute"))
            }
        })?;
    }

    Ok(shptr)
}

/// The field holding the self reference, if any.
///
/// An explicit `#[shptr(weak_this)]` wins; otherwise a single field whose
/// type is named `WeakThis` is picked.
fn find_weak_this(fields: &Fields) -> syn::Result<Option<Member>> {
    let member = |i: usize, field: &Field| {
        field
            .ident
            .clone()
            .map_or_else(|| Member::Unnamed(Index::from(i)), Member::Named)
    };

    let mut marked = None;
    for (i, field) in fields.iter().enumerate() {
        if !has_weak_this_attr(field)? {
            continue;
        }
        if marked.is_some() {
            return Err(syn::Error::new_spanned(
                field,
                "only one field may be marked `#[shptr(weak_this)]`",
            ));
        }
        marked = Some(member(i, field));
    }
    if marked.is_some() {
        return Ok(marked);
    }

    let mut by_type = fields
        .iter()
        .enumerate()
        .filter(|(_, field)| is_weak_this_type(&field.ty));
    let found = by_type.next();
    if let Some((_, second)) = by_type.next() {
        return Err(syn::Error::new(
            second.span(),
            "multiple `WeakThis` fields; mark the self reference with `#[shptr(weak_this)]`",
        ));
    }
    Ok(found.map(|(i, field)| member(i, field)))
}

fn has_weak_this_attr(field: &Field) -> syn::Result<bool> {
    let mut found = false;

    for attr in &field.attrs {
        if !attr.path().is_ident("shptr") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("weak_this") {
                found = true;
                Ok(())
            } else {
                Err(meta.error("unsupported field attribute, expected `weak_this`"))
            }
        })?;
    }

    Ok(found)
}

fn is_weak_this_type(ty: &Type) -> bool {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .is_some_and(|segment| segment.ident == "WeakThis"),
        Type::Group(group) => is_weak_this_type(&group.elem),
        Type::Paren(paren) => is_weak_this_type(&paren.elem),
        _ => false,
    }
}
