use proc_macro2::TokenStream;
use quote::{ToTokens, quote};
use syn::{
    FnArg, GenericArgument, Ident, ImplItemFn, Pat, PathArguments, ReturnType, Type, TypePath,
    parse_quote, spanned::Spanned,
};

pub(crate) fn expand(mut function: ImplItemFn) -> syn::Result<TokenStream> {
    let sig = &function.sig;
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(
            sig.fn_token.span(),
            "`transactional` methods must be `async fn`",
        ));
    }
    match sig.inputs.first() {
        Some(FnArg::Receiver(receiver))
            if receiver.reference.is_some() && receiver.mutability.is_none() => {}
        _ => {
            return Err(syn::Error::new(
                sig.ident.span(),
                "`transactional` methods must take `&self`",
            ));
        }
    }
    let (scope, scope_type) = scope_parameter(sig.inputs.iter())
        .ok_or_else(|| {
            syn::Error::new(
                sig.inputs.span(),
                "`transactional` methods need a `&mut Scope<_>` parameter",
            )
        })?;
    let (result_type, value_type) = match &sig.output {
        ReturnType::Type(_, ty) => {
            let value = result_value(ty).ok_or_else(|| {
                syn::Error::new(ty.span(), "`transactional` methods must return a `Result`")
            })?;
            (ty.as_ref().clone(), value)
        }
        ReturnType::Default => {
            return Err(syn::Error::new(
                sig.ident.span(),
                "`transactional` methods must return a `Result`",
            ));
        }
    };
    let body = &function.block;
    let block = quote! {{
        ::tether::TransactionalService::unit_of_work(self)
            .run(#scope, async move |#scope: #scope_type| -> #result_type #body)
            .await
    }};
    function.sig.output = parse_quote!(-> ::tether::Result<#value_type>);
    function.block = syn::parse2(block)?;
    Ok(function.into_token_stream())
}

/// The `&mut Scope<_>` parameter, its lifetime removed so the work closure
/// stays higher ranked.
fn scope_parameter<'a>(inputs: impl Iterator<Item = &'a FnArg>) -> Option<(Ident, Type)> {
    inputs.into_iter().find_map(|arg| {
        let FnArg::Typed(typed) = arg else {
            return None;
        };
        let Type::Reference(reference) = typed.ty.as_ref() else {
            return None;
        };
        reference.mutability?;
        let Type::Path(TypePath { path, .. }) = reference.elem.as_ref() else {
            return None;
        };
        if path.segments.last()?.ident != "Scope" {
            return None;
        }
        let Pat::Ident(pat) = typed.pat.as_ref() else {
            return None;
        };
        let elem = &reference.elem;
        Some((pat.ident.clone(), parse_quote!(&mut #elem)))
    })
}

/// `T` out of `Result<T, ..>`.
fn result_value(ty: &Type) -> Option<Type> {
    let Type::Path(TypePath { path, .. }) = ty else {
        return None;
    };
    let segment = path.segments.last()?;
    if segment.ident != "Result" {
        return None;
    }
    let PathArguments::AngleBracketed(arguments) = &segment.arguments else {
        return None;
    };
    arguments.args.iter().find_map(|arg| match arg {
        GenericArgument::Type(ty) => Some(ty.clone()),
        _ => None,
    })
}
