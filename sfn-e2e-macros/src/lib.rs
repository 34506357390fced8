//! Proc macros for the sfn-e2e harness
//!
//! Provides the `#[sfn_e2e::test]` attribute for live lifecycle tests.

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::meta::ParseNestedMeta;
use syn::{FnArg, ItemFn, LitStr, Pat, PatType, ReturnType, Type};

/// Attribute macro for live lifecycle tests.
///
/// Wraps an async fn in `#[tokio::test]`, skips it unless its service is
/// selected through `E2E_SERVICES`, initializes logging, and injects a
/// `Harness` built from the environment when the fn takes a `harness`
/// parameter.
///
/// # Example
///
/// ```ignore
/// use sfn_e2e::{sfn, BoxError, Harness};
///
/// #[sfn_e2e::test(service = "sfn")]
/// async fn test_create_activity(harness: Harness) -> Result<(), BoxError> {
///     let desired = sfn::activity_desired(&harness)?;
///     harness
///         .lifecycle(sfn::activity(), desired)
///         .run(|activity| async move {
///             assert!(activity.exists().await);
///             Ok(())
///         })
///         .await?;
///     Ok(())
/// }
/// ```
///
/// # What it does
///
/// 1. Return early (pass) when `service` is not in `E2E_SERVICES`
/// 2. Install the tracing subscriber
/// 3. Build `Harness::from_env()` if the fn wants one
/// 4. Run the body; an `Err` return fails the test with the error's message
///
/// Without `service = "..."` the test always runs.
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut args = TestArgs::default();
    let parser = syn::meta::parser(|meta| args.parse(meta));
    syn::parse_macro_input!(attr with parser);

    let input_fn = syn::parse_macro_input!(item as ItemFn);
    test_impl(&args, &input_fn)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

#[derive(Debug, Default)]
struct TestArgs {
    service: Option<String>,
}

impl TestArgs {
    fn parse(&mut self, meta: ParseNestedMeta) -> syn::Result<()> {
        if meta.path.is_ident("service") {
            let value: LitStr = meta.value()?.parse()?;
            self.service = Some(value.value());
            Ok(())
        } else {
            Err(meta.error("unsupported argument, expected `service = \"...\"`"))
        }
    }
}

/// Whether the fn takes a parameter named `harness`; other parameters are an error
fn has_harness_param(input_fn: &ItemFn) -> syn::Result<bool> {
    let mut found = false;
    for arg in &input_fn.sig.inputs {
        let is_harness = match arg {
            FnArg::Typed(PatType { pat, .. }) => {
                matches!(pat.as_ref(), Pat::Ident(ident) if ident.ident == "harness")
            }
            FnArg::Receiver(_) => false,
        };
        if !is_harness {
            return Err(syn::Error::new_spanned(
                arg,
                "only a `harness: Harness` parameter can be injected",
            ));
        }
        found = true;
    }
    Ok(found)
}

/// Whether the fn returns a `Result`; `()` is fine, anything else is an error
fn has_result_return(input_fn: &ItemFn) -> syn::Result<bool> {
    let ty = match &input_fn.sig.output {
        ReturnType::Default => return Ok(false),
        ReturnType::Type(_, ty) => ty,
    };
    match ty.as_ref() {
        Type::Tuple(tuple) if tuple.elems.is_empty() => Ok(false),
        Type::Path(path) if path.path.segments.last().is_some_and(|s| s.ident == "Result") => {
            Ok(true)
        }
        other => Err(syn::Error::new_spanned(
            other,
            "#[sfn_e2e::test] functions must return `()` or a `Result`",
        )),
    }
}

/// Inner implementation that works with `proc_macro2` types for testability
fn test_impl(args: &TestArgs, input_fn: &ItemFn) -> syn::Result<proc_macro2::TokenStream> {
    if input_fn.sig.asyncness.is_none() {
        return Err(syn::Error::new_spanned(
            input_fn.sig.fn_token,
            "#[sfn_e2e::test] functions must be async",
        ));
    }

    let fn_name = &input_fn.sig.ident;
    let fn_vis = &input_fn.vis;
    let fn_attrs = &input_fn.attrs;

    // The annotated fn, renamed and nested, keeps its exact signature so `?`
    // in the body resolves against the declared error type.
    let body_name = format_ident!("__sfn_e2e_{}", fn_name);
    let mut body_fn = input_fn.clone();
    body_fn.sig.ident = body_name.clone();
    body_fn.attrs.clear();
    body_fn.vis = syn::Visibility::Inherited;

    let skip_check = args.service.as_ref().map(|service| {
        quote! {
            if !::sfn_e2e::marker::service_selected(#service) {
                eprintln!(
                    "[sfn-e2e] skipping {}: service '{}' not selected (set {})",
                    stringify!(#fn_name),
                    #service,
                    ::sfn_e2e::marker::ENV_SERVICES,
                );
                return;
            }
        }
    });

    let call = if has_harness_param(input_fn)? {
        quote! {
            let harness = ::sfn_e2e::Harness::from_env()
                .await
                .unwrap_or_else(|e| panic!("Failed to create Harness: {}", e));
            #body_name(harness).await
        }
    } else {
        quote! { #body_name().await }
    };

    let run = if has_result_return(input_fn)? {
        quote! {
            if let Err(e) = { #call } {
                panic!("{} failed: {}", stringify!(#fn_name), e);
            }
        }
    } else {
        quote! { #call; }
    };

    Ok(quote! {
        #(#fn_attrs)*
        #[::tokio::test]
        #fn_vis async fn #fn_name() {
            #body_fn

            #skip_check
            ::sfn_e2e::telemetry::init_logging();
            #run
        }
    })
}
