mod transactional;

use proc_macro::TokenStream;
use syn::{ImplItemFn, parse_macro_input};

/// Run the body of a service method inside a transaction.
///
/// The method must be an `async fn` taking `&self`, a `&mut Scope<D>`
/// parameter and returning a `Result<T, E>`. The body becomes the work of
/// `UnitOfWork::run` on the unit of work returned by the service's
/// `TransactionalService` implementation, the method then returns
/// `tether::Result<T>`: it commits when the body returns `Ok` and rolls back
/// when it returns `Err`.
///
/// ```rust,ignore
/// impl TransactionalService for TransferService {
///     type Driver = SqliteDriver;
///     fn unit_of_work(&self) -> &UnitOfWork<SqliteDriver> {
///         &self.unit_of_work
///     }
/// }
///
/// impl TransferService {
///     #[transactional]
///     async fn transfer(&self, scope: &mut Scope<SqliteDriver>, from: &str, to: &str, amount: i64) -> anyhow::Result<()> {
///         /* repository calls with `scope` */
///     }
/// }
/// ```
#[proc_macro_attribute]
pub fn transactional(attr: TokenStream, item: TokenStream) -> TokenStream {
    if !attr.is_empty() {
        return syn::Error::new(
            proc_macro2::TokenStream::from(attr).into_iter().next().map_or_else(
                proc_macro2::Span::call_site,
                |t| t.span(),
            ),
            "`transactional` does not take arguments",
        )
        .into_compile_error()
        .into();
    }
    let function = parse_macro_input!(item as ImplItemFn);
    transactional::expand(function)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
