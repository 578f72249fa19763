use crate::AttributeArgs;
use proc_macro::TokenStream;
use quote::{quote, ToTokens};
use syn::parse::Parser;

fn token_stream_to_compile_err(mut tokens: TokenStream, err: syn::Error) -> TokenStream {
    tokens.extend(TokenStream::from(err.into_compile_error()));
    tokens
}

pub fn main(args: TokenStream, item: TokenStream) -> TokenStream {
    let input: syn::ItemFn = match syn::parse(item.clone()) {
        Ok(input) => input,
        Err(e) => return token_stream_to_compile_err(item, e),
    };

    impl_attribute(input, args, false).unwrap_or_else(|e| token_stream_to_compile_err(item, e))
}

pub fn test(args: TokenStream, item: TokenStream) -> TokenStream {
    let input: syn::ItemFn = match syn::parse(item.clone()) {
        Ok(input) => input,
        Err(e) => return token_stream_to_compile_err(item, e),
    };

    if let Some(attr) = input.attrs.iter().find(|attr| attr.path.is_ident("test")) {
        let msg = "Second #[test] attribute is supplied";
        return token_stream_to_compile_err(item, syn::Error::new_spanned(&attr, msg));
    }

    impl_attribute(input, args, true).unwrap_or_else(|e| token_stream_to_compile_err(item, e))
}

pub fn title(args: TokenStream, item: TokenStream) -> TokenStream {
    let input: syn::ItemFn = match syn::parse(item.clone()) {
        Ok(input) => input,
        Err(e) => return token_stream_to_compile_err(item, e),
    };

    impl_title(input, args).unwrap_or_else(|e| token_stream_to_compile_err(item, e))
}

fn impl_attribute(
    mut input: syn::ItemFn,
    args: TokenStream,
    is_test: bool,
) -> syn::Result<TokenStream> {
    if !input.sig.inputs.is_empty() {
        let msg = "Cannot accept arguments";
        return Err(syn::Error::new_spanned(&input.sig.ident, msg));
    }

    if let Some(asyncness) = input.sig.asyncness {
        let msg = "Async functions are not supported";
        return Err(syn::Error::new_spanned(asyncness, msg));
    }

    let args = AttributeArgs::parse_terminated.parse(args)?;
    let config = Config::parse(args, is_test)?;

    let header = if config.is_test {
        quote! { #[::core::prelude::v1::test] }
    } else {
        quote! {}
    };

    let log = config.log();

    let brace_token = input.block.brace_token;
    let block = input.block;
    input.block = syn::parse2(quote! {
        {
            ::treelog::private::run(#log, || #block)
        }
    })?;
    input.block.brace_token = brace_token;

    Ok(quote! {
        #header
        #input
    }
    .into())
}

fn impl_title(mut input: syn::ItemFn, args: TokenStream) -> syn::Result<TokenStream> {
    if let Some(asyncness) = input.sig.asyncness {
        let msg = "Async functions are not supported";
        return Err(syn::Error::new_spanned(asyncness, msg));
    }

    let args = AttributeArgs::parse_terminated.parse(args)?;
    let mut name = None;
    for arg in args {
        match arg {
            syn::NestedMeta::Lit(syn::Lit::Str(s)) if name.is_none() => name = Some(s),
            other => {
                return Err(syn::Error::new_spanned(
                    other,
                    "Expected at most one string literal, the context title",
                ))
            }
        }
    }

    // A `title` parameter takes precedence over the attribute argument and
    // the function name.
    let has_title_param = input.sig.inputs.iter().any(|arg| match arg {
        syn::FnArg::Typed(pat_type) => match &*pat_type.pat {
            syn::Pat::Ident(pat) => pat.ident == "title",
            _ => false,
        },
        syn::FnArg::Receiver(_) => false,
    });

    let title = if has_title_param {
        quote! { &title }
    } else {
        let name = name.unwrap_or_else(|| {
            syn::LitStr::new(&input.sig.ident.to_string(), input.sig.ident.span())
        });
        quote! { &#name }
    };

    let brace_token = input.block.brace_token;
    let block = input.block;
    input.block = syn::parse2(quote! {
        {
            let __treelog_context = ::treelog::private::title(#title);
            #block
        }
    })?;
    input.block.brace_token = brace_token;

    Ok(input.into_token_stream().into())
}

enum Formatter {
    Plain,
    Rich,
}

struct Config {
    formatter: Option<Formatter>,
    verbosity: Option<proc_macro2::Ident>,
    is_test: bool,
}

impl Config {
    fn new(is_test: bool) -> Self {
        Config {
            formatter: None,
            verbosity: None,
            is_test,
        }
    }

    fn parse(args: AttributeArgs, is_test: bool) -> syn::Result<Self> {
        let mut config = Config::new(is_test);

        for arg in args {
            match arg {
                syn::NestedMeta::Meta(syn::Meta::NameValue(namevalue)) => {
                    let ident = namevalue
                        .path
                        .get_ident()
                        .ok_or_else(|| {
                            syn::Error::new_spanned(&namevalue, "Must have a specified ident")
                        })?
                        .to_string()
                        .to_lowercase();
                    match ident.as_str() {
                        "fmt" => config.set_formatter(&namevalue)?,
                        "verbose" => config.set_verbosity(&namevalue)?,
                        name => {
                            let message = format!(
                                "Unknown argument `{}` is specified; expected one of: `fmt`, `verbose`",
                                name,
                            );
                            return Err(syn::Error::new_spanned(namevalue, message));
                        }
                    }
                }
                other => {
                    return Err(syn::Error::new_spanned(
                        other,
                        "Unknown argument inside the macro",
                    ));
                }
            }
        }

        Ok(config)
    }

    fn set_formatter(&mut self, namevalue: &syn::MetaNameValue) -> syn::Result<()> {
        if self.formatter.is_some() {
            Err(syn::Error::new_spanned(
                namevalue,
                "Argument `fmt` is defined multiple times",
            ))
        } else if let syn::Lit::Str(ref s) = namevalue.lit {
            match s.value().as_str() {
                "plain" => self.formatter = Some(Formatter::Plain),
                "rich" => self.formatter = Some(Formatter::Rich),
                value => {
                    let msg = format!(
                        "Argument `fmt` expects either `plain` or `rich`, but found: `{}`",
                        value
                    );
                    return Err(syn::Error::new_spanned(&namevalue.lit, msg));
                }
            }
            Ok(())
        } else {
            Err(syn::Error::new_spanned(
                &namevalue.lit,
                "Argument `fmt` expects a string literal value",
            ))
        }
    }

    fn set_verbosity(&mut self, namevalue: &syn::MetaNameValue) -> syn::Result<()> {
        if self.verbosity.is_some() {
            Err(syn::Error::new_spanned(
                namevalue,
                "Argument `verbose` is defined multiple times",
            ))
        } else if let syn::Lit::Str(s) = &namevalue.lit {
            let variant = match s.value().to_lowercase().as_str() {
                "error" => "Error",
                "warning" => "Warning",
                "user" => "User",
                "info" => "Info",
                "debug" => "Debug",
                value => {
                    let msg = format!(
                        "Argument `verbose` expects one of `error`, `warning`, `user`, `info` or `debug`, but found: `{}`",
                        value
                    );
                    return Err(syn::Error::new_spanned(&namevalue.lit, msg));
                }
            };
            self.verbosity = Some(proc_macro2::Ident::new(variant, s.span()));
            Ok(())
        } else {
            Err(syn::Error::new_spanned(
                &namevalue.lit,
                "Argument `verbose` expects a string literal value",
            ))
        }
    }

    fn log(self) -> proc_macro2::TokenStream {
        let is_test = self.is_test;
        let rich = matches!(self.formatter, Some(Formatter::Rich));
        let verbosity = match self.verbosity {
            Some(variant) => quote! { ::core::option::Option::Some(::treelog::Level::#variant) },
            None => quote! { ::core::option::Option::None },
        };

        quote! { ::treelog::private::console(#is_test, #rich, #verbosity) }
    }
}
